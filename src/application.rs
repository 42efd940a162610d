//! Application layer - end-to-end sync tasks built from the infrastructure
//! pieces. Each task is independent and runs to completion in one pass.

pub mod commission_sync;
pub mod product_id_sync;

pub use commission_sync::{CommissionSyncTask, SyncOutcome};
pub use product_id_sync::ProductIdSyncTask;
