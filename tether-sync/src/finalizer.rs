//! Bookkeeping that runs on every exit path of a sync run.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tether_types::{BindingId, BindingStore, ServiceState, StoreResult, SyncCursor, SyncState};
use tracing::{error, info, warn};

/// Persists the run's final state, completion time and cursor exactly once.
///
/// Call [`finish`](Self::finish) with the classified outcome. If the guard is
/// dropped first (the run future was cancelled or unwound), it persists
/// `Error` with the cursor as last observed.
pub(crate) struct RunFinalizer {
    store: Arc<dyn BindingStore>,
    binding_id: BindingId,
    cursor: Arc<Mutex<SyncCursor>>,
    armed: bool,
}

impl RunFinalizer {
    pub fn new(store: Arc<dyn BindingStore>, binding_id: BindingId, cursor: Arc<Mutex<SyncCursor>>) -> Self {
        Self {
            store,
            binding_id,
            cursor,
            armed: true,
        }
    }

    pub fn finish(mut self, outcome: SyncState) -> StoreResult<ServiceState> {
        self.armed = false;
        self.persist(outcome)
    }

    fn persist(&self, outcome: SyncState) -> StoreResult<ServiceState> {
        let cursor = self.cursor.lock().clone();
        let finished_at = Utc::now();
        let state = self.store.update_state(self.binding_id, &mut |state| {
            state.finish_run(outcome, finished_at, cursor.clone());
        })?;
        info!(binding_id = %self.binding_id, state = %outcome, "Sync run finished");
        Ok(state)
    }
}

impl Drop for RunFinalizer {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(binding_id = %self.binding_id, "Sync run aborted before completion");
        if let Err(e) = self.persist(SyncState::Error) {
            error!(binding_id = %self.binding_id, error = %e, "Failed to persist aborted run");
        }
    }
}
