//! Scheduled sync jobs, one per target binding.

use crate::db::{Database, from_millis, to_millis};
use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use std::time::Duration;
use tether_types::{BindingId, JobScheduler, StoreResult, SyncJob};

type JobRow = (String, i64, i64, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<JobRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode((target, due_ms, recurrence_ms, payload): JobRow) -> StorageResult<SyncJob> {
    Ok(SyncJob {
        target_id: BindingId::parse(&target)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?,
        due_time: from_millis(due_ms)?,
        recurrence: Duration::from_millis(u64::try_from(recurrence_ms).unwrap_or(0)),
        payload: serde_json::from_str(&payload)?,
    })
}

pub struct SqliteJobScheduler {
    db: Database,
}

impl SqliteJobScheduler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn save(&self, job: &SyncJob) -> StorageResult<()> {
        let recurrence_ms = i64::try_from(job.recurrence.as_millis()).unwrap_or(i64::MAX);
        self.db.lock().execute(
            "INSERT INTO sync_jobs (target_id, due_ms, recurrence_ms, payload) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(target_id) DO UPDATE SET due_ms = excluded.due_ms,
                recurrence_ms = excluded.recurrence_ms, payload = excluded.payload",
            params![
                job.target_id.to_string(),
                to_millis(job.due_time),
                recurrence_ms,
                serde_json::to_string(&job.payload)?,
            ],
        )?;
        Ok(())
    }

    fn load(&self, target_id: BindingId) -> StorageResult<Option<SyncJob>> {
        self.db
            .lock()
            .query_row(
                "SELECT target_id, due_ms, recurrence_ms, payload FROM sync_jobs WHERE target_id = ?1",
                params![target_id.to_string()],
                read_row,
            )
            .optional()?
            .map(decode)
            .transpose()
    }

    fn load_due(&self, now: DateTime<Utc>) -> StorageResult<Vec<SyncJob>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT target_id, due_ms, recurrence_ms, payload FROM sync_jobs
             WHERE due_ms <= ?1 ORDER BY due_ms, target_id",
        )?;
        let rows = stmt.query_map(params![to_millis(now)], read_row)?;
        rows.map(|row| decode(row?)).collect()
    }

    fn delete(&self, target_id: BindingId) -> StorageResult<()> {
        self.db.lock().execute(
            "DELETE FROM sync_jobs WHERE target_id = ?1",
            params![target_id.to_string()],
        )?;
        Ok(())
    }
}

impl JobScheduler for SqliteJobScheduler {
    fn upsert(&self, job: &SyncJob) -> StoreResult<()> {
        Ok(self.save(job)?)
    }

    fn get(&self, target_id: BindingId) -> StoreResult<Option<SyncJob>> {
        Ok(self.load(target_id)?)
    }

    fn due(&self, now: DateTime<Utc>) -> StoreResult<Vec<SyncJob>> {
        Ok(self.load_due(now)?)
    }

    fn remove(&self, target_id: BindingId) -> StoreResult<()> {
        Ok(self.delete(target_id)?)
    }
}
