//! In-memory collaborators for tests and ephemeral hosts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tether_consumer::{DataClient, DataError, DataQuery, DataRecord, extract_timestamp};
use tether_types::{
    AuthSettings, BindingId, BindingStore, JobScheduler, ServiceBinding, ServiceId, ServiceState,
    SettingsStore, StoreError, StoreResult, SyncJob,
};

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<HashMap<ServiceId, AuthSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, id: ServiceId) -> StoreResult<Option<AuthSettings>> {
        Ok(self.settings.lock().get(&id).cloned())
    }

    fn put(&self, id: ServiceId, settings: &AuthSettings) -> StoreResult<()> {
        self.settings.lock().insert(id, settings.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBindingStore {
    bindings: Mutex<HashMap<BindingId, ServiceBinding>>,
}

impl MemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BindingStore for MemoryBindingStore {
    fn get(&self, id: BindingId) -> StoreResult<Option<ServiceBinding>> {
        Ok(self.bindings.lock().get(&id).cloned())
    }

    fn insert(&self, binding: &ServiceBinding) -> StoreResult<()> {
        self.bindings.lock().insert(binding.id, binding.clone());
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<ServiceBinding>> {
        let mut all: Vec<_> = self.bindings.lock().values().cloned().collect();
        all.sort_by_key(|b| (b.created_at, b.id));
        Ok(all)
    }

    fn update_state(
        &self,
        id: BindingId,
        mutate: &mut dyn FnMut(&mut ServiceState),
    ) -> StoreResult<ServiceState> {
        let mut bindings = self.bindings.lock();
        let binding = bindings
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("binding {id}")))?;
        mutate(&mut binding.state);
        Ok(binding.state.clone())
    }
}

#[derive(Debug, Default)]
pub struct MemoryJobScheduler {
    jobs: Mutex<HashMap<BindingId, SyncJob>>,
}

impl MemoryJobScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobScheduler for MemoryJobScheduler {
    fn upsert(&self, job: &SyncJob) -> StoreResult<()> {
        self.jobs.lock().insert(job.target_id, job.clone());
        Ok(())
    }

    fn get(&self, target_id: BindingId) -> StoreResult<Option<SyncJob>> {
        Ok(self.jobs.lock().get(&target_id).cloned())
    }

    fn due(&self, now: DateTime<Utc>) -> StoreResult<Vec<SyncJob>> {
        let mut due: Vec<_> = self
            .jobs
            .lock()
            .values()
            .filter(|job| job.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|job| (job.due_time, job.target_id));
        Ok(due)
    }

    fn remove(&self, target_id: BindingId) -> StoreResult<()> {
        self.jobs.lock().remove(&target_id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDataClient {
    records: Mutex<HashMap<(BindingId, String), DataRecord>>,
}

impl MemoryDataClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataClient for MemoryDataClient {
    async fn get_singleton(&self, scope: BindingId, type_tag: &str) -> Result<Option<Value>, DataError> {
        Ok(self
            .records
            .lock()
            .get(&(scope, type_tag.to_string()))
            .map(|record| record.value.clone()))
    }

    async fn update_singleton(
        &self,
        scope: BindingId,
        type_tag: &str,
        timestamp_key: &str,
        value: Value,
    ) -> Result<(), DataError> {
        let record = DataRecord {
            scope,
            type_tag: type_tag.to_string(),
            timestamp: extract_timestamp(&value, timestamp_key),
            value,
            updated_at: Utc::now(),
        };
        self.records.lock().insert((scope, type_tag.to_string()), record);
        Ok(())
    }

    async fn filter(&self, query: &DataQuery, offset: usize, limit: usize) -> Result<Vec<DataRecord>, DataError> {
        let mut matching: Vec<_> = self
            .records
            .lock()
            .values()
            .filter(|record| query.matches(record.scope, &record.type_tag))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            (a.updated_at, a.scope, &a.type_tag).cmp(&(b.updated_at, b.scope, &b.type_tag))
        });
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }
}
