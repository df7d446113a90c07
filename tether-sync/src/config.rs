//! Sync scheduling configuration.

use crate::policy::FullSyncMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_types::DEFAULT_RECURRENCE;

/// The `[sync]` section of the daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between scheduled runs of one binding.
    pub recurrence_secs: u64,
    pub full_sync: FullSyncMode,
    /// Seconds between job runner polls.
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            recurrence_secs: DEFAULT_RECURRENCE.as_secs(),
            full_sync: FullSyncMode::default(),
            poll_interval_secs: 30,
        }
    }
}

impl SyncConfig {
    pub fn recurrence(&self) -> Duration {
        Duration::from_secs(self.recurrence_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
