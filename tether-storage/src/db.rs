//! Shared SQLite connection and schema.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A SQLite database shared by all tether stores.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at `path`, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened tether database");
        Self::with_connection(conn)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> StorageResult<()> {
        self.lock().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS service_settings (
                service_id TEXT PRIMARY KEY,
                settings TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS service_bindings (
                id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                sync_state TEXT NOT NULL,
                last_sync_ms INTEGER,
                next_sync_ms INTEGER,
                cursor_object TEXT,
                cursor_date_ms INTEGER,
                created_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_jobs (
                target_id TEXT PRIMARY KEY,
                due_ms INTEGER NOT NULL,
                recurrence_ms INTEGER NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sync_jobs_due ON sync_jobs(due_ms);

            CREATE TABLE IF NOT EXISTS singletons (
                scope TEXT NOT NULL,
                type_tag TEXT NOT NULL,
                value TEXT NOT NULL,
                timestamp_ms INTEGER,
                updated_at_ms INTEGER NOT NULL,
                PRIMARY KEY (scope, type_tag)
            );
            ",
        )?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp out of range: {ms}")))
}

pub(crate) fn from_opt_millis(ms: Option<i64>) -> StorageResult<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}
