//! Per-binding synchronization state.
//!
//! `SyncState` is the gate the orchestrator consults before every run;
//! `ServiceState` is the persisted bookkeeping record mutated only by it.

use crate::ids::{BindingId, ServiceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authorization / run status of a service binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Connected but never authorized.
    #[default]
    Off,
    /// Authorization was rejected or has lapsed.
    Unauthorized,
    /// An incremental run is in flight.
    SynchronizingPartial,
    /// A full run is in flight.
    SynchronizingFull,
    /// The last run (or authorization) succeeded.
    Success,
    /// The last run failed for a reason other than authorization.
    Error,
}

impl SyncState {
    /// All states, in declaration order.
    pub const ALL: [SyncState; 6] = [
        SyncState::Off,
        SyncState::Unauthorized,
        SyncState::SynchronizingPartial,
        SyncState::SynchronizingFull,
        SyncState::Success,
        SyncState::Error,
    ];

    /// Gating states forbid a sync run outright.
    pub fn is_gating(&self) -> bool {
        matches!(self, Self::Off | Self::Unauthorized)
    }

    /// True while a run is in flight.
    pub fn is_synchronizing(&self) -> bool {
        matches!(self, Self::SynchronizingPartial | Self::SynchronizingFull)
    }

    /// The in-flight state for a run of the given kind.
    pub fn synchronizing(full_sync: bool) -> Self {
        if full_sync {
            Self::SynchronizingFull
        } else {
            Self::SynchronizingPartial
        }
    }

    /// Stable string form used by persistent stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Unauthorized => "unauthorized",
            Self::SynchronizingPartial => "synchronizing_partial",
            Self::SynchronizingFull => "synchronizing_full",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidSyncState(s.to_string()))
    }
}

/// Resume markers a partial sync leaves behind for the next run.
///
/// Both fields are opaque to the host; only the plugin interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub current_object: Option<String>,
    pub current_date_utc: Option<DateTime<Utc>>,
}

impl SyncCursor {
    pub fn new(current_object: Option<String>, current_date_utc: Option<DateTime<Utc>>) -> Self {
        Self {
            current_object,
            current_date_utc,
        }
    }
}

/// Persisted per-binding sync bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub sync_state: SyncState,
    pub last_synchronization_utc: Option<DateTime<Utc>>,
    pub next_synchronization_utc: Option<DateTime<Utc>>,
    pub sync_current_object: Option<String>,
    pub sync_current_date_utc: Option<DateTime<Utc>>,
}

impl ServiceState {
    /// The resume cursor stored with this state.
    pub fn cursor(&self) -> SyncCursor {
        SyncCursor::new(
            self.sync_current_object.clone(),
            self.sync_current_date_utc,
        )
    }

    /// Records the end of a run: final state, completion time and cursor.
    pub fn finish_run(&mut self, outcome: SyncState, finished_at: DateTime<Utc>, cursor: SyncCursor) {
        self.sync_state = outcome;
        self.last_synchronization_utc = Some(finished_at);
        self.sync_current_object = cursor.current_object;
        self.sync_current_date_utc = cursor.current_date_utc;
    }
}

/// What a binding connects: a service consumer, or an ordinary app.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    #[default]
    Service,
    App,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::App => "app",
        }
    }
}

impl FromStr for BindingKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service" => Ok(Self::Service),
            "app" => Ok(Self::App),
            other => Err(crate::Error::InvalidBindingKind(other.to_string())),
        }
    }
}

/// Association between a user account and a service consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinding {
    pub id: BindingId,
    pub service_id: ServiceId,
    pub kind: BindingKind,
    pub state: ServiceState,
    pub created_at: DateTime<Utc>,
}

impl ServiceBinding {
    /// A freshly connected service binding, starting in `Off`.
    pub fn connect(service_id: ServiceId) -> Self {
        Self {
            id: BindingId::new(),
            service_id,
            kind: BindingKind::Service,
            state: ServiceState::default(),
            created_at: Utc::now(),
        }
    }

    pub fn is_service(&self) -> bool {
        self.kind == BindingKind::Service
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gating_states() {
        assert!(SyncState::Off.is_gating());
        assert!(SyncState::Unauthorized.is_gating());
        assert!(!SyncState::Success.is_gating());
        assert!(!SyncState::Error.is_gating());
        assert!(!SyncState::SynchronizingFull.is_gating());
    }

    #[test]
    fn finish_run_overwrites_cursor() {
        let mut state = ServiceState {
            sync_state: SyncState::SynchronizingPartial,
            sync_current_object: Some("old".into()),
            ..Default::default()
        };
        let now = Utc::now();
        state.finish_run(SyncState::Success, now, SyncCursor::default());

        assert_eq!(state.sync_state, SyncState::Success);
        assert_eq!(state.last_synchronization_utc, Some(now));
        assert_eq!(state.sync_current_object, None);
    }

    #[test]
    fn connect_starts_off() {
        let binding = ServiceBinding::connect(ServiceId::from_uuid(uuid::Uuid::new_v4()));
        assert_eq!(binding.state.sync_state, SyncState::Off);
        assert!(binding.is_service());
        assert!(binding.state.last_synchronization_utc.is_none());
    }
}
