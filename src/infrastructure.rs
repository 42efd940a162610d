//! Infrastructure layer for the remote tabular store, retry policy,
//! notification sink, configuration, and logging.

pub mod bitable_client;
pub mod config;  // Configuration structs, defaults, and ConfigManager
pub mod fetcher;
pub mod logging;  // Logging infrastructure
pub mod notify;
pub mod retry;
pub mod session;
pub mod table_store;
pub mod writer;

// Re-export commonly used items
pub use bitable_client::BitableClient;
pub use config::{AppConfig, ConfigError, ConfigManager};
pub use fetcher::{FetchError, PageFetcher};
pub use logging::{get_log_directory, init_logging};
pub use notify::{NotificationSink, Notifier};
pub use retry::{RetryOutcome, RetryPolicy};
pub use session::{PageActions, PageError, SessionState};
pub use table_store::{
    BatchWriteResult, MAX_RECORDS_PER_CALL, SearchFilter, SearchPage, StoreError, TableCoordinates,
    TableStore,
};
pub use writer::{BatchedWriter, WriteReport};
