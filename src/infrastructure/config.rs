//! Configuration infrastructure
//!
//! Configuration is loaded once at process start and passed by reference into
//! each component; there is no ambient global state. The file holds tenant
//! credentials, table coordinates, sync tuning, retry policy, browser options
//! and notification settings. Secrets can be overridden from the environment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Default values for all settings.
pub mod defaults {
    pub const BASE_URL: &str = "https://open.larkoffice.com/open-apis";
    pub const PAGE_SIZE: u32 = 500;
    pub const BATCH_SIZE: usize = 500;
    pub const WORKER_COUNT: usize = 5;
    pub const PRUNE_REMOVED: bool = false;
    pub const RETRY_MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_DELAY_SECONDS: u64 = 5;
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const USER_AGENT: &str = "bitable-sync/0.2";
    pub const HEADLESS: bool = true;
    pub const PAGE_WAIT_TIMEOUT_SECONDS: u64 = 30;
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
    pub const LOG_JSON_FORMAT: bool = false;
}

/// A missing required option is a fatal startup condition; validation runs
/// before any network or browser activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration option: {name}")]
    MissingOption { name: &'static str },

    #[error("configuration file not found at {path}")]
    FileNotFound { path: PathBuf },
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Tenant API credentials and endpoint
    pub store: StoreConfig,

    /// Target table coordinates per task
    pub tables: TablesConfig,

    /// Paging, chunking and fan-out tuning
    pub sync: SyncConfig,

    /// Retry policy for flaky operations
    pub retry: RetryConfig,

    /// Browser automation options
    pub browser: BrowserConfig,

    /// Webhook notification settings
    pub notify: NotifyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP client settings
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    pub app_id: String,
    pub app_secret: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            app_id: String::new(),
            app_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    /// App token shared by all tables of the tenant app
    pub app_token: String,

    /// Commission order table
    pub commission_table_id: String,

    /// Product id table
    pub product_table_id: String,

    /// Store ids fanned out over by the product-id sync
    pub store_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Page size for remote searches
    pub page_size: u32,

    /// Records per outbound batch call (remote cap is 500)
    pub batch_size: usize,

    /// Bounded worker pool size for per-store fan-out
    pub worker_count: usize,

    /// Also delete remote rows whose key disappeared upstream
    pub prune_removed: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::PAGE_SIZE,
            batch_size: defaults::BATCH_SIZE,
            worker_count: defaults::WORKER_COUNT,
            prune_removed: defaults::PRUNE_REMOVED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_attempts: u32,

    /// Fixed delay between attempts in seconds
    pub delay_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            delay_seconds: defaults::RETRY_DELAY_SECONDS,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> crate::infrastructure::retry::RetryPolicy {
        crate::infrastructure::retry::RetryPolicy::new(
            self.max_attempts,
            std::time::Duration::from_secs(self.delay_seconds),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run the browser without a visible window
    pub headless: bool,

    /// Path to the saved cookie/session-state blob
    pub session_state_path: PathBuf,

    /// Bounded timeout for page-load and element-visibility waits
    pub page_wait_timeout_seconds: u64,

    /// Merchant console entry point for the commission export
    pub commission_url: String,

    /// Merchant console entry point for per-store product listings.
    /// `{store_id}` is substituted per store.
    pub product_list_url: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: defaults::HEADLESS,
            session_state_path: PathBuf::new(),
            page_wait_timeout_seconds: defaults::PAGE_WAIT_TIMEOUT_SECONDS,
            commission_url: String::new(),
            product_list_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Chat webhook URL; notifications are skipped when absent
    pub webhook_url: Option<String>,

    /// User ids to @-mention in outcome messages
    pub mentioned_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Enable JSON formatted logs (file output only)
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            json_format: defaults::LOG_JSON_FORMAT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout for HTTP requests in seconds
    pub request_timeout_seconds: u64,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

impl AppConfig {
    /// Overlays secrets from the environment. Env vars win over file values
    /// so credentials never have to live on disk.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(app_id) = std::env::var("BITABLE_SYNC_APP_ID") {
            self.store.app_id = app_id;
        }
        if let Ok(app_secret) = std::env::var("BITABLE_SYNC_APP_SECRET") {
            self.store.app_secret = app_secret;
        }
        if let Ok(webhook_url) = std::env::var("BITABLE_SYNC_WEBHOOK_URL") {
            self.notify.webhook_url = Some(webhook_url);
        }
    }

    /// Rejects startup when a required option is missing. Runs before any
    /// network or browser activity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn required(value: &str, name: &'static str) -> Result<(), ConfigError> {
            if value.trim().is_empty() {
                Err(ConfigError::MissingOption { name })
            } else {
                Ok(())
            }
        }

        required(&self.store.app_id, "store.app_id")?;
        required(&self.store.app_secret, "store.app_secret")?;
        required(&self.tables.app_token, "tables.app_token")?;
        required(&self.tables.commission_table_id, "tables.commission_table_id")?;
        required(&self.tables.product_table_id, "tables.product_table_id")?;
        Ok(())
    }
}

/// Loads and saves the JSON configuration file.
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Config lives in the platform config directory, overridable through
    /// the `BITABLE_SYNC_CONFIG` environment variable.
    pub fn new() -> Result<Self> {
        let config_path = match std::env::var("BITABLE_SYNC_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => dirs::config_dir()
                .context("failed to resolve user config directory")?
                .join("bitable-sync")
                .join("bitable_sync_config.json"),
        };
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Loads the file, creating it with defaults on first run so operators
    /// have a template to fill in.
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("first run detected, writing default configuration to {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }
        self.load_config().await
    }

    pub async fn load_config(&self) -> Result<AppConfig> {
        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("failed to read config file {:?}", self.config_path))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {:?}", self.config_path))?;
        Ok(config)
    }

    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create config directory {parent:?}"))?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_path, content)
            .await
            .with_context(|| format!("failed to write config file {:?}", self.config_path))?;
        Ok(())
    }
}
