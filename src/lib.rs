//! bitable-sync - Merchant console to Bitable reconciliation toolkit
//!
//! Each task runs to completion in a single pass: fetch the keys already
//! present in the remote table, compute the delta against freshly scraped
//! candidates, and write only the delta back in remote-cap-sized chunks.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export the pieces most callers need
pub use domain::reconcile::reconcile;
pub use domain::record::{FieldValue, Record};
pub use infrastructure::fetcher::PageFetcher;
pub use infrastructure::retry::{RetryOutcome, RetryPolicy};
pub use infrastructure::table_store::TableStore;
pub use infrastructure::writer::{BatchedWriter, WriteReport};
