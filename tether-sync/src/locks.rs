//! Per-binding run locks.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tether_types::BindingId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// At most one holder per binding id. Different ids never contend.
#[derive(Default)]
pub(crate) struct RunLocks {
    locks: Mutex<HashMap<BindingId, Arc<AsyncMutex<()>>>>,
}

impl RunLocks {
    /// Waits until no other run holds `id`.
    pub async fn acquire(&self, id: BindingId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Entries only referenced by the map have no holder or waiter.
            locks.retain(|other, lock| *other == id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}
