//! Authorization settings per service id.

use crate::db::Database;
use crate::error::StorageResult;
use rusqlite::{OptionalExtension, params};
use tether_types::{AuthSettings, ServiceId, SettingsStore, StoreResult};

pub struct SqliteSettingsStore {
    db: Database,
}

impl SqliteSettingsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn load(&self, id: ServiceId) -> StorageResult<Option<AuthSettings>> {
        let raw: Option<String> = self
            .db
            .lock()
            .query_row(
                "SELECT settings FROM service_settings WHERE service_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    fn save(&self, id: ServiceId, settings: &AuthSettings) -> StorageResult<()> {
        let json = serde_json::to_string(settings)?;
        self.db.lock().execute(
            "INSERT INTO service_settings (service_id, settings) VALUES (?1, ?2)
             ON CONFLICT(service_id) DO UPDATE SET settings = excluded.settings",
            params![id.to_string(), json],
        )?;
        Ok(())
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn get(&self, id: ServiceId) -> StoreResult<Option<AuthSettings>> {
        Ok(self.load(id)?)
    }

    fn put(&self, id: ServiceId, settings: &AuthSettings) -> StoreResult<()> {
        Ok(self.save(id, settings)?)
    }
}
