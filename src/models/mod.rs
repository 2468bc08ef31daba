use uuid::Uuid;

pub mod price;
pub mod price_change;
pub mod product;
pub mod session;

// Re-exports for convenience
pub use price::*;
pub use price_change::*;
pub use product::*;
pub use session::*;

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
