//! Destination data singletons.

use crate::db::{Database, from_millis, from_opt_millis, to_millis};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use serde_json::Value;
use tether_consumer::{DataClient, DataError, DataQuery, DataRecord, extract_timestamp};
use tether_types::BindingId;

type SingletonRow = (String, String, String, Option<i64>, i64);

fn read_row(row: &Row<'_>) -> rusqlite::Result<SingletonRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode((scope, type_tag, value, timestamp_ms, updated_at_ms): SingletonRow) -> StorageResult<DataRecord> {
    Ok(DataRecord {
        scope: BindingId::parse(&scope).map_err(|e| StorageError::InvalidData(e.to_string()))?,
        type_tag,
        value: serde_json::from_str(&value)?,
        timestamp: from_opt_millis(timestamp_ms)?,
        updated_at: from_millis(updated_at_ms)?,
    })
}

/// [`DataClient`] writing singletons into the tether database.
pub struct SqliteDataClient {
    db: Database,
}

impl SqliteDataClient {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn load(&self, scope: BindingId, type_tag: &str) -> StorageResult<Option<Value>> {
        let raw: Option<String> = self
            .db
            .lock()
            .query_row(
                "SELECT value FROM singletons WHERE scope = ?1 AND type_tag = ?2",
                params![scope.to_string(), type_tag],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    fn save(&self, scope: BindingId, type_tag: &str, timestamp_key: &str, value: &Value) -> StorageResult<()> {
        let timestamp = extract_timestamp(value, timestamp_key);
        self.db.lock().execute(
            "INSERT INTO singletons (scope, type_tag, value, timestamp_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(scope, type_tag) DO UPDATE SET value = excluded.value,
                timestamp_ms = excluded.timestamp_ms, updated_at_ms = excluded.updated_at_ms",
            params![
                scope.to_string(),
                type_tag,
                serde_json::to_string(value)?,
                timestamp.map(to_millis),
                to_millis(Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn select(&self, query: &DataQuery, offset: usize, limit: usize) -> StorageResult<Vec<DataRecord>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT scope, type_tag, value, timestamp_ms, updated_at_ms FROM singletons
             WHERE (?1 IS NULL OR scope = ?1) AND (?2 IS NULL OR type_tag = ?2)
             ORDER BY updated_at_ms, scope, type_tag LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt.query_map(
            params![
                query.scope.map(|s| s.to_string()),
                query.type_tag,
                i64::try_from(limit).unwrap_or(i64::MAX),
                i64::try_from(offset).unwrap_or(i64::MAX),
            ],
            read_row,
        )?;
        rows.map(|row| decode(row?)).collect()
    }
}

#[async_trait]
impl DataClient for SqliteDataClient {
    async fn get_singleton(&self, scope: BindingId, type_tag: &str) -> Result<Option<Value>, DataError> {
        Ok(self.load(scope, type_tag)?)
    }

    async fn update_singleton(
        &self,
        scope: BindingId,
        type_tag: &str,
        timestamp_key: &str,
        value: Value,
    ) -> Result<(), DataError> {
        Ok(self.save(scope, type_tag, timestamp_key, &value)?)
    }

    async fn filter(&self, query: &DataQuery, offset: usize, limit: usize) -> Result<Vec<DataRecord>, DataError> {
        Ok(self.select(query, offset, limit)?)
    }
}
