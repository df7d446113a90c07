//! User-service bindings and their persisted sync state.

use crate::db::{Database, from_millis, from_opt_millis, to_millis};
use crate::error::{StorageError, StorageResult};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tether_types::{
    BindingId, BindingStore, ServiceBinding, ServiceId, ServiceState, StoreError, StoreResult,
};

const SELECT_BINDING: &str = "SELECT id, service_id, kind, sync_state, last_sync_ms, next_sync_ms,
        cursor_object, cursor_date_ms, created_at_ms FROM service_bindings";

/// A binding row before its columns are parsed.
struct BindingRow {
    id: String,
    service_id: String,
    kind: String,
    sync_state: String,
    last_sync_ms: Option<i64>,
    next_sync_ms: Option<i64>,
    cursor_object: Option<String>,
    cursor_date_ms: Option<i64>,
    created_at_ms: i64,
}

impl BindingRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            service_id: row.get(1)?,
            kind: row.get(2)?,
            sync_state: row.get(3)?,
            last_sync_ms: row.get(4)?,
            next_sync_ms: row.get(5)?,
            cursor_object: row.get(6)?,
            cursor_date_ms: row.get(7)?,
            created_at_ms: row.get(8)?,
        })
    }

    fn decode(self) -> StorageResult<ServiceBinding> {
        let invalid = |e: uuid::Error| StorageError::InvalidData(e.to_string());
        let parse = |e: tether_types::Error| StorageError::InvalidData(e.to_string());
        Ok(ServiceBinding {
            id: BindingId::parse(&self.id).map_err(invalid)?,
            service_id: ServiceId::parse(&self.service_id).map_err(invalid)?,
            kind: self.kind.parse().map_err(parse)?,
            state: ServiceState {
                sync_state: self.sync_state.parse().map_err(parse)?,
                last_synchronization_utc: from_opt_millis(self.last_sync_ms)?,
                next_synchronization_utc: from_opt_millis(self.next_sync_ms)?,
                sync_current_object: self.cursor_object,
                sync_current_date_utc: from_opt_millis(self.cursor_date_ms)?,
            },
            created_at: from_millis(self.created_at_ms)?,
        })
    }
}

pub struct SqliteBindingStore {
    db: Database,
}

impl SqliteBindingStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn load(conn: &Connection, id: BindingId) -> StorageResult<Option<ServiceBinding>> {
        conn.query_row(
            &format!("{SELECT_BINDING} WHERE id = ?1"),
            params![id.to_string()],
            BindingRow::read,
        )
        .optional()?
        .map(BindingRow::decode)
        .transpose()
    }

    fn write_state(conn: &Connection, id: BindingId, state: &ServiceState) -> StorageResult<()> {
        conn.execute(
            "UPDATE service_bindings SET sync_state = ?2, last_sync_ms = ?3, next_sync_ms = ?4,
                cursor_object = ?5, cursor_date_ms = ?6 WHERE id = ?1",
            params![
                id.to_string(),
                state.sync_state.as_str(),
                state.last_synchronization_utc.map(to_millis),
                state.next_synchronization_utc.map(to_millis),
                state.sync_current_object,
                state.sync_current_date_utc.map(to_millis),
            ],
        )?;
        Ok(())
    }

    fn list_all(&self) -> StorageResult<Vec<ServiceBinding>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!("{SELECT_BINDING} ORDER BY created_at_ms, id"))?;
        let rows = stmt.query_map([], BindingRow::read)?;
        rows.map(|row| row?.decode()).collect()
    }

    fn insert_row(&self, binding: &ServiceBinding) -> StorageResult<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO service_bindings (id, service_id, kind, sync_state, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                binding.id.to_string(),
                binding.service_id.to_string(),
                binding.kind.as_str(),
                binding.state.sync_state.as_str(),
                to_millis(binding.created_at),
            ],
        )?;
        Self::write_state(&conn, binding.id, &binding.state)
    }

    fn mutate(
        &self,
        id: BindingId,
        mutate: &mut dyn FnMut(&mut ServiceState),
    ) -> StorageResult<Option<ServiceState>> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let Some(binding) = Self::load(&tx, id)? else {
            return Ok(None);
        };
        let mut state = binding.state;
        mutate(&mut state);
        Self::write_state(&tx, id, &state)?;
        tx.commit()?;
        Ok(Some(state))
    }
}

impl BindingStore for SqliteBindingStore {
    fn get(&self, id: BindingId) -> StoreResult<Option<ServiceBinding>> {
        Ok(Self::load(&self.db.lock(), id)?)
    }

    fn insert(&self, binding: &ServiceBinding) -> StoreResult<()> {
        Ok(self.insert_row(binding)?)
    }

    fn list(&self) -> StoreResult<Vec<ServiceBinding>> {
        Ok(self.list_all()?)
    }

    fn update_state(
        &self,
        id: BindingId,
        mutate: &mut dyn FnMut(&mut ServiceState),
    ) -> StoreResult<ServiceState> {
        self.mutate(id, mutate)?
            .ok_or_else(|| StoreError::NotFound(format!("binding {id}")))
    }
}
