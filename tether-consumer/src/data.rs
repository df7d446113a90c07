//! Destination data client boundary.
//!
//! Consumers write what they pull through this client. The orchestrator
//! never calls it directly except to persist credentials and configuration.

use crate::error::DataError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_types::BindingId;

/// Selection criteria for [`DataClient::filter`]. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuery {
    pub scope: Option<BindingId>,
    pub type_tag: Option<String>,
}

impl DataQuery {
    pub fn scope(scope: BindingId) -> Self {
        Self {
            scope: Some(scope),
            type_tag: None,
        }
    }

    pub fn with_type(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = Some(type_tag.into());
        self
    }

    pub fn matches(&self, scope: BindingId, type_tag: &str) -> bool {
        self.scope.is_none_or(|s| s == scope)
            && self.type_tag.as_deref().is_none_or(|t| t == type_tag)
    }
}

/// One stored singleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub scope: BindingId,
    pub type_tag: String,
    pub value: Value,
    /// Taken from the value's timestamp field when it carries one.
    pub timestamp: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Destination data store client.
#[async_trait]
pub trait DataClient: Send + Sync {
    /// The singleton of `type_tag` stored for `scope`, if any.
    async fn get_singleton(&self, scope: BindingId, type_tag: &str)
    -> Result<Option<Value>, DataError>;

    /// Replaces the singleton of `type_tag` for `scope`. `timestamp_key`
    /// names the field in `value` holding the record's timestamp.
    async fn update_singleton(
        &self,
        scope: BindingId,
        type_tag: &str,
        timestamp_key: &str,
        value: Value,
    ) -> Result<(), DataError>;

    async fn filter(
        &self,
        query: &DataQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DataRecord>, DataError>;

    /// Like [`get_singleton`](Self::get_singleton) but falls back to `default`.
    async fn get_singleton_or(
        &self,
        scope: BindingId,
        type_tag: &str,
        default: Value,
    ) -> Result<Value, DataError> {
        Ok(self.get_singleton(scope, type_tag).await?.unwrap_or(default))
    }
}

/// Reads `value[timestamp_key]` as a timestamp: RFC 3339 strings and unix
/// seconds are accepted.
pub fn extract_timestamp(value: &Value, timestamp_key: &str) -> Option<DateTime<Utc>> {
    if timestamp_key.is_empty() {
        return None;
    }
    match value.get(timestamp_key)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamp_from_rfc3339_or_seconds() {
        let v = json!({"at": "2024-03-01T12:00:00Z", "uts": 1709294400});
        let a = extract_timestamp(&v, "at").unwrap();
        let b = extract_timestamp(&v, "uts").unwrap();
        assert_eq!(a, b);
        assert!(extract_timestamp(&v, "missing").is_none());
        assert!(extract_timestamp(&v, "").is_none());
    }

    #[test]
    fn query_matching() {
        let scope = BindingId::new();
        let other = BindingId::new();
        let query = DataQuery::scope(scope).with_type("track");
        assert!(query.matches(scope, "track"));
        assert!(!query.matches(other, "track"));
        assert!(!query.matches(scope, "album"));
        assert!(DataQuery::default().matches(other, "album"));
    }
}
