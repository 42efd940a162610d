//! Browser session state and the page-action seam
//!
//! Authenticated scraping reuses a previously captured cookie blob instead of
//! repeating an interactive login; a missing blob is a fatal precondition for
//! any task that needs the merchant console. The [`PageActions`] trait is the
//! narrow surface the sync tasks drive, so the retry/reconcile logic can be
//! exercised against a fake implementation without a real browser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session state file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read session state {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed session state {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One saved cookie from a previous interactive login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub expiry: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// Opaque authentication artifact loaded from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: Vec<SessionCookie>,
}

impl SessionState {
    /// Loads the cookie blob. Absence is fatal for authenticated tasks.
    pub async fn load(path: &Path) -> Result<Self, SessionError> {
        if !path.exists() {
            return Err(SessionError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SessionError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let state: Self =
            serde_json::from_str(&content).map_err(|source| SessionError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        info!(cookies = state.cookies.len(), path = %path.display(), "session state loaded");
        Ok(state)
    }
}

/// UI-automation step failures. Timeouts are the only self-terminating
/// mechanism for a stuck automation step.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("timed out after {waited:?} waiting for '{selector}'")]
    Timeout { selector: String, waited: Duration },

    #[error("element not found: '{selector}'")]
    NotFound { selector: String },

    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// Narrow page-action interface over a browser session. One session is
/// reused sequentially across keys and pages within a task run; it is never
/// shared across threads.
#[async_trait]
pub trait PageActions: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// Bounded wait for an element to become visible.
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<(), PageError>;

    async fn read_text(&self, selector: &str) -> Result<String, PageError>;

    async fn click(&self, selector: &str) -> Result<(), PageError>;

    async fn fill(&self, selector: &str, value: &str) -> Result<(), PageError>;

    /// Best-effort diagnostic artifact (screenshot equivalent) for a failed
    /// step. Must not fail the caller.
    async fn capture_diagnostic(&self, label: &str);
}
