//! Typed record model for the remote tabular store
//!
//! Records used to be loose `HashMap<String, serde_json::Value>` blobs with
//! serialization rules enforced by field-name matching. The tagged
//! [`FieldValue`] union makes the rules explicit: text serializes as a JSON
//! string, numbers as JSON numbers, and date fields as integer milliseconds.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single cell value in a remote table row.
///
/// Untagged on the wire: the remote store speaks plain JSON scalars.
/// Timestamps are written as integer epoch milliseconds; on the read path
/// they come back as plain numbers, which is fine because the read path only
/// projects key columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Timestamp(i64),
}

impl FieldValue {
    /// Epoch-millisecond timestamp from a `chrono` datetime.
    pub fn timestamp(at: chrono::DateTime<chrono::Utc>) -> Self {
        Self::Timestamp(at.timestamp_millis())
    }

    /// Text view of the value, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// One row of a remote table. `record_id` is populated on the read path and
/// omitted when creating rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Text content of a named field, if present and textual.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_text)
    }

    /// The deduplication key stored in `key_field`, trimmed. `None` when the
    /// field is missing, non-text, or empty after trimming.
    pub fn key(&self, key_field: &str) -> Option<String> {
        self.text(key_field).and_then(normalize_key)
    }
}

/// Keys are compared by exact string equality after trimming whitespace.
/// Returns `None` for values that are empty once trimmed.
pub fn normalize_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_serialization_shapes() {
        assert_eq!(
            serde_json::to_value(FieldValue::Text("A-100".into())).unwrap(),
            serde_json::json!("A-100")
        );
        assert_eq!(
            serde_json::to_value(FieldValue::Number(12.5)).unwrap(),
            serde_json::json!(12.5)
        );
        assert_eq!(
            serde_json::to_value(FieldValue::Timestamp(1_700_000_000_000)).unwrap(),
            serde_json::json!(1_700_000_000_000_i64)
        );
    }

    #[test]
    fn record_serializes_without_id_on_create() {
        let record = Record::new().with_field("product_id", "P-1");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("record_id").is_none());
        assert_eq!(json["fields"]["product_id"], "P-1");
    }

    #[test]
    fn key_is_trimmed_and_empty_is_none() {
        let record = Record::new().with_field("id", "  P-42  ");
        assert_eq!(record.key("id"), Some("P-42".to_string()));

        let blank = Record::new().with_field("id", "   ");
        assert_eq!(blank.key("id"), None);
        assert_eq!(blank.key("missing"), None);
    }

    #[test]
    fn normalize_key_rejects_whitespace_only() {
        assert_eq!(normalize_key(" x "), Some("x".to_string()));
        assert_eq!(normalize_key("\t\n"), None);
    }
}
