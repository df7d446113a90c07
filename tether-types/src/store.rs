//! Persistence collaborator boundaries.
//!
//! These traits are synchronous: the sync orchestrator persists its final
//! bookkeeping from a drop guard, which cannot await.

use crate::ids::{BindingId, ServiceId};
use crate::settings::AuthSettings;
use crate::state::{ServiceBinding, ServiceState};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default recurrence between scheduled sync runs.
pub const DEFAULT_RECURRENCE: Duration = Duration::from_secs(60 * 60);

/// Errors raised by persistence collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persisted per-consumer authorization settings. Last write wins per id.
pub trait SettingsStore: Send + Sync {
    fn get(&self, id: ServiceId) -> StoreResult<Option<AuthSettings>>;
    fn put(&self, id: ServiceId, settings: &AuthSettings) -> StoreResult<()>;
}

/// Persisted user-service bindings and their sync state.
pub trait BindingStore: Send + Sync {
    fn get(&self, id: BindingId) -> StoreResult<Option<ServiceBinding>>;
    fn insert(&self, binding: &ServiceBinding) -> StoreResult<()>;
    fn list(&self) -> StoreResult<Vec<ServiceBinding>>;

    /// Applies `mutate` to the stored state and persists the result
    /// atomically, returning the new state.
    fn update_state(
        &self,
        id: BindingId,
        mutate: &mut dyn FnMut(&mut ServiceState),
    ) -> StoreResult<ServiceState>;
}

/// A scheduled sync job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub target_id: BindingId,
    pub due_time: DateTime<Utc>,
    pub recurrence: Duration,
    pub payload: serde_json::Value,
}

impl SyncJob {
    /// A job for `target_id` due one recurrence after `now`.
    pub fn schedule(target_id: BindingId, now: DateTime<Utc>, recurrence: Duration) -> Self {
        Self {
            target_id,
            due_time: advance(now, recurrence),
            recurrence,
            payload: serde_json::json!({ "binding_id": target_id }),
        }
    }

    /// The same job moved forward by one recurrence from `now`.
    pub fn rescheduled(&self, now: DateTime<Utc>) -> Self {
        Self {
            due_time: advance(now, self.recurrence),
            ..self.clone()
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_time <= now
    }
}

/// `now + recurrence`, saturating at the latest representable instant.
pub fn advance(now: DateTime<Utc>, recurrence: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(recurrence)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Job scheduler collaborator with upsert-by-target semantics.
pub trait JobScheduler: Send + Sync {
    fn upsert(&self, job: &SyncJob) -> StoreResult<()>;
    fn get(&self, target_id: BindingId) -> StoreResult<Option<SyncJob>>;
    /// Jobs whose due time is at or before `now`, earliest first.
    fn due(&self, now: DateTime<Utc>) -> StoreResult<Vec<SyncJob>>;
    fn remove(&self, target_id: BindingId) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_sets_due_one_recurrence_out() {
        let now = Utc::now();
        let id = BindingId::new();
        let job = SyncJob::schedule(id, now, DEFAULT_RECURRENCE);
        assert_eq!(job.due_time, now + TimeDelta::hours(1));
        assert_eq!(job.payload["binding_id"], id.to_string());
        assert!(!job.is_due(now));
        assert!(job.is_due(now + TimeDelta::hours(2)));
    }

    #[test]
    fn advance_saturates() {
        let now = Utc::now();
        assert_eq!(advance(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
