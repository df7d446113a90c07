//! Full-sync decision policies.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tether_types::ServiceState;

/// Decides whether a run should re-pull everything instead of resuming
/// from the cursor.
pub trait FullSyncPolicy: Send + Sync {
    fn full_sync(&self, state: &ServiceState, now: DateTime<Utc>) -> bool;
}

/// Always partial.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverFullSync;

impl FullSyncPolicy for NeverFullSync {
    fn full_sync(&self, _state: &ServiceState, _now: DateTime<Utc>) -> bool {
        false
    }
}

/// Full on the first run of each calendar month (UTC), and on a binding's
/// first run ever.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstOfMonth;

impl FullSyncPolicy for FirstOfMonth {
    fn full_sync(&self, state: &ServiceState, now: DateTime<Utc>) -> bool {
        match state.last_synchronization_utc {
            None => true,
            Some(last) => (last.year(), last.month()) != (now.year(), now.month()),
        }
    }
}

/// Policy selection as written in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullSyncMode {
    #[default]
    Never,
    FirstOfMonth,
}

impl FullSyncMode {
    pub fn policy(self) -> Arc<dyn FullSyncPolicy> {
        match self {
            Self::Never => Arc::new(NeverFullSync),
            Self::FirstOfMonth => Arc::new(FirstOfMonth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn synced_at(at: Option<DateTime<Utc>>) -> ServiceState {
        ServiceState {
            last_synchronization_utc: at,
            ..Default::default()
        }
    }

    #[test]
    fn first_of_month_crosses_month_boundaries() {
        let jan_31 = Utc.with_ymd_and_hms(2024, 1, 31, 23, 0, 0).unwrap();
        let feb_1 = Utc.with_ymd_and_hms(2024, 2, 1, 1, 0, 0).unwrap();
        let feb_2 = Utc.with_ymd_and_hms(2024, 2, 2, 1, 0, 0).unwrap();

        assert!(FirstOfMonth.full_sync(&synced_at(None), feb_1));
        assert!(FirstOfMonth.full_sync(&synced_at(Some(jan_31)), feb_1));
        assert!(!FirstOfMonth.full_sync(&synced_at(Some(feb_1)), feb_2));
        assert!(!NeverFullSync.full_sync(&synced_at(None), feb_1));
    }

    #[test]
    fn mode_parses_from_config_strings() {
        let mode: FullSyncMode = serde_json::from_str("\"first_of_month\"").unwrap();
        assert_eq!(mode, FullSyncMode::FirstOfMonth);
        assert_eq!(FullSyncMode::default(), FullSyncMode::Never);
    }
}
