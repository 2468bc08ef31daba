pub mod cache;
pub mod config;
pub mod models;
pub mod notifiers;
pub mod portal;
pub mod reconciler;
pub mod scheduler;
pub mod storage;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use cache::{product_cache, CacheManager, ProductCache};
pub use config::AppConfig;
pub use reconciler::{ReconciliationJob, ReconciliationSummary};
pub use scheduler::{JobRunner, JobState, ReconciliationScheduler};
pub use utils::error::{AppError, Result};
