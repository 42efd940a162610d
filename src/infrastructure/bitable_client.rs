//! Reqwest-backed implementation of [`TableStore`] for the tenant HTTP API
//!
//! Token-based and stateless per call: the tenant access token is obtained
//! once when the client connects and attached to every request. No
//! transactional semantics exist on the remote side.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::record::Record;
use crate::infrastructure::config::{HttpConfig, StoreConfig};
use crate::infrastructure::table_store::{
    BatchWriteResult, MAX_RECORDS_PER_CALL, SearchFilter, SearchPage, StoreError, TableCoordinates,
    TableStore,
};

/// Envelope every API response is wrapped in. `code == 0` means success.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T, StoreError> {
        if self.code != 0 {
            return Err(StoreError::Api {
                code: self.code,
                message: self.msg,
            });
        }
        self.data.ok_or(StoreError::Api {
            code: -1,
            message: "response envelope had no data".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: String,
}

#[derive(Debug, Deserialize)]
struct CreatedRecords {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Default, Deserialize)]
struct DeletedRecords {}

/// HTTP client for the Bitable-style tabular store.
pub struct BitableClient {
    http: Client,
    base_url: String,
    token: String,
}

impl BitableClient {
    /// Builds the HTTP client and exchanges app credentials for a tenant
    /// access token. Fails fast so configuration problems surface before any
    /// task work starts.
    pub async fn connect(store: &StoreConfig, http: &HttpConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.request_timeout_seconds))
            .user_agent(&http.user_agent)
            .gzip(true)
            .build()?;

        let base_url = store.base_url.trim_end_matches('/').to_string();
        let token_url = format!("{base_url}/auth/v3/tenant_access_token/internal");
        let response: TokenResponse = client
            .post(&token_url)
            .json(&json!({ "app_id": store.app_id, "app_secret": store.app_secret }))
            .send()
            .await?
            .json()
            .await?;

        if response.code != 0 {
            return Err(StoreError::Api {
                code: response.code,
                message: response.msg,
            });
        }

        info!("🔑 Tenant access token obtained");
        Ok(Self {
            http: client,
            base_url,
            token: response.tenant_access_token,
        })
    }

    fn records_url(&self, table: &TableCoordinates, suffix: &str) -> String {
        format!(
            "{}/bitable/v1/apps/{}/tables/{}/records/{}",
            self.base_url, table.app_token, table.table_id, suffix
        )
    }

    fn ensure_cap(len: usize) -> Result<(), StoreError> {
        if len > MAX_RECORDS_PER_CALL {
            Err(StoreError::BatchTooLarge { len })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TableStore for BitableClient {
    async fn search(
        &self,
        table: &TableCoordinates,
        field_names: &[String],
        filter: Option<&SearchFilter>,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<SearchPage, StoreError> {
        let mut body = json!({ "field_names": field_names });
        if let Some(filter) = filter {
            body["filter"] = serde_json::to_value(filter)?;
        }

        let mut request = self
            .http
            .post(self.records_url(table, "search"))
            .bearer_auth(&self.token)
            .query(&[("page_size", page_size.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("page_token", token)]);
        }

        debug!(
            table = %table.table_id,
            page_size,
            has_token = page_token.is_some(),
            "searching remote table"
        );

        let envelope: ApiEnvelope<SearchPage> =
            request.json(&body).send().await?.json().await?;
        envelope.into_data()
    }

    async fn batch_create(
        &self,
        table: &TableCoordinates,
        records: &[Record],
    ) -> Result<BatchWriteResult, StoreError> {
        Self::ensure_cap(records.len())?;

        let envelope: ApiEnvelope<CreatedRecords> = self
            .http
            .post(self.records_url(table, "batch_create"))
            .bearer_auth(&self.token)
            .json(&json!({ "records": records }))
            .send()
            .await?
            .json()
            .await?;

        // An API-level rejection is a per-chunk outcome, not a transport
        // failure: surface it through the result so the writer can continue.
        if envelope.code != 0 {
            return Ok(BatchWriteResult::rejected(envelope.code, envelope.msg));
        }
        let created = envelope.into_data()?;
        Ok(BatchWriteResult::created(created.records.len() as u32))
    }

    async fn batch_delete(
        &self,
        table: &TableCoordinates,
        record_ids: &[String],
    ) -> Result<BatchWriteResult, StoreError> {
        Self::ensure_cap(record_ids.len())?;

        let envelope: ApiEnvelope<DeletedRecords> = self
            .http
            .post(self.records_url(table, "batch_delete"))
            .bearer_auth(&self.token)
            .json(&json!({ "records": record_ids }))
            .send()
            .await?
            .json()
            .await?;

        if envelope.code != 0 {
            return Ok(BatchWriteResult::rejected(envelope.code, envelope.msg));
        }
        Ok(BatchWriteResult::created(record_ids.len() as u32))
    }
}
