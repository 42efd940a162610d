//! Chat webhook notification sink
//!
//! Fire-and-forget: delivery failures are logged and never retried, and a
//! failed notification never fails the task that produced it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::infrastructure::config::{HttpConfig, NotifyConfig};

/// Outcome sink the sync tasks report through. Kept as a seam so the
/// notification trigger can be exercised without a live webhook.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sends a text message. Never returns an error: delivery failure is an
    /// operator-log concern, not a task failure.
    async fn post_text(&self, content: &str);
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    msgtype: &'static str,
    text: TextPayload<'a>,
}

#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    content: &'a str,
    mentioned_list: &'a [String],
}

/// Posts outcome summaries to a chat webhook.
pub struct Notifier {
    client: Client,
    webhook_url: String,
    mentioned_list: Vec<String>,
}

impl Notifier {
    /// Returns `None` when no webhook is configured; callers simply skip
    /// notification in that case.
    pub fn from_config(notify: &NotifyConfig, http: &HttpConfig) -> Option<Self> {
        let webhook_url = notify.webhook_url.clone()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(http.request_timeout_seconds))
            .user_agent(&http.user_agent)
            .build()
            .ok()?;
        Some(Self {
            client,
            webhook_url,
            mentioned_list: notify.mentioned_list.clone(),
        })
    }
}

#[async_trait]
impl NotificationSink for Notifier {
    async fn post_text(&self, content: &str) {
        let message = TextMessage {
            msgtype: "text",
            text: TextPayload {
                content,
                mentioned_list: &self.mentioned_list,
            },
        };

        match self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(status = %response.status(), "notification delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "webhook rejected notification");
            }
            Err(error) => {
                warn!(%error, "failed to deliver notification");
            }
        }
    }
}
