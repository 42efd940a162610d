//! Domain module - Core data model and pure reconciliation logic
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod reconcile;
pub mod record;

// Re-export commonly used items for convenience
pub use reconcile::reconcile;
pub use record::{FieldValue, Record, normalize_key};
