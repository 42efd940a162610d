//! Boundary contract for the remote tabular store
//!
//! The store is a tenant-hosted spreadsheet-as-database service. The trait
//! keeps the sync pipeline testable against an in-memory implementation and
//! keeps vendor HTTP details inside [`crate::infrastructure::bitable_client`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::record::Record;

/// Hard remote limit on records per batch_create / batch_delete call.
pub const MAX_RECORDS_PER_CALL: usize = 500;

/// Coordinates of one table inside a tenant app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCoordinates {
    pub app_token: String,
    pub table_id: String,
}

impl TableCoordinates {
    pub fn new(app_token: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            app_token: app_token.into(),
            table_id: table_id.into(),
        }
    }
}

/// Filter predicate on a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operator", content = "value", rename_all = "camelCase")]
pub enum FilterOperator {
    IsEmpty,
    IsNotEmpty,
    Is(String),
}

/// One condition of a search filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field_name: String,
    #[serde(flatten)]
    pub operator: FilterOperator,
}

/// Boolean conjunction of field conditions. Only `and` is needed by the
/// sync tasks; the remote API supports nothing we would miss here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub conjunction: Conjunction,
    pub conditions: Vec<FilterCondition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conjunction {
    #[default]
    And,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty_field(mut self, field_name: &str) -> Self {
        self.conditions.push(FilterCondition {
            field_name: field_name.to_string(),
            operator: FilterOperator::IsEmpty,
        });
        self
    }

    #[must_use]
    pub fn field_is(mut self, field_name: &str, value: &str) -> Self {
        self.conditions.push(FilterCondition {
            field_name: field_name.to_string(),
            operator: FilterOperator::Is(value.to_string()),
        });
        self
    }
}

/// One page of search results. An absent `page_token` or `has_more == false`
/// terminates the fetch loop; callers never spin on a missing flag.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<Record>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub page_token: Option<String>,
}

/// Outcome of one batch_create / batch_delete call. A rejected batch comes
/// back as `success == false` with the remote error attached so the writer
/// can log it and move on to the next chunk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchWriteResult {
    pub success: bool,
    #[serde(default)]
    pub created_count: u32,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl BatchWriteResult {
    pub fn created(count: u32) -> Self {
        Self {
            success: true,
            created_count: count,
            error_code: None,
            error_message: None,
        }
    }

    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self {
            success: false,
            created_count: 0,
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }
}

/// Transport-level or contract-level store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote API rejected the request (code {code}): {message}")]
    Api { code: i64, message: String },

    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("batch of {len} records exceeds the remote cap of {MAX_RECORDS_PER_CALL}")]
    BatchTooLarge { len: usize },
}

/// Read/write access to the remote tabular store.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Requests one page of records, projecting `field_names` and applying
    /// `filter` when present. `page_token` is the cursor returned by the
    /// previous page, absent on the first request.
    async fn search(
        &self,
        table: &TableCoordinates,
        field_names: &[String],
        filter: Option<&SearchFilter>,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<SearchPage, StoreError>;

    /// Creates up to [`MAX_RECORDS_PER_CALL`] records in one call.
    async fn batch_create(
        &self,
        table: &TableCoordinates,
        records: &[Record],
    ) -> Result<BatchWriteResult, StoreError>;

    /// Deletes up to [`MAX_RECORDS_PER_CALL`] records by id in one call.
    async fn batch_delete(
        &self,
        table: &TableCoordinates,
        record_ids: &[String],
    ) -> Result<BatchWriteResult, StoreError>;
}
