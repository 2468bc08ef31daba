use async_trait::async_trait;

use crate::models::{NewSessionRecord, Product, SessionRecord};
use crate::utils::error::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Persistence for tracked products and their price history.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Every product with its prices newest-first, ordered by sequence code.
    async fn find_all(&self) -> Result<Vec<Product>>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Product>>;

    /// Insert or replace a product together with its full price list.
    async fn save(&self, product: &Product) -> Result<()>;
}

/// Persistence for acquired portal sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The most recently acquired record; ties on the date go to the lowest id.
    async fn latest(&self) -> Result<Option<SessionRecord>>;

    /// Store the day's session. A record already held for the same date is
    /// overwritten in place, keeping its id.
    async fn save_session(&self, record: NewSessionRecord) -> Result<SessionRecord>;
}
