//! Process-wide registry of instantiated service consumers.
//!
//! The registry is populated lazily on first lookup, or explicitly through
//! [`ServiceRegistry::find_services`]. Scans are serialized by `scan_lock`;
//! lookups only take the map's read lock and never wait on plugin I/O. A
//! rescan replaces the whole map at once when it finishes.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tether_consumer::{ConfigData, ServiceConsumer};
use tether_types::{ServiceId, SettingsStore};
use tracing::{debug, error, info, warn};

use crate::binder::SettingsBinder;
use crate::error::PluginHostError;
use crate::source::ConsumerSource;

/// Counts from one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub registered: usize,
    pub skipped: usize,
    pub evicted: usize,
}

pub struct ServiceRegistry {
    source: Arc<dyn ConsumerSource>,
    binder: SettingsBinder,
    entries: RwLock<HashMap<ServiceId, Arc<dyn ServiceConsumer>>>,
    scan_lock: Mutex<()>,
    initialized: AtomicBool,
}

impl ServiceRegistry {
    pub fn new(source: Arc<dyn ConsumerSource>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            source,
            binder: SettingsBinder::new(settings),
            entries: RwLock::new(HashMap::new()),
            scan_lock: Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Clears the registry and repopulates it from the consumer source.
    pub fn find_services(&self) -> Result<ScanReport, PluginHostError> {
        let _scan = self.scan_lock.lock();
        self.scan_locked()
    }

    /// Builds the new map off to the side and publishes it in one write, so
    /// lookups during a rescan keep seeing the previous registrations.
    fn scan_locked(&self) -> Result<ScanReport, PluginHostError> {
        self.initialized.store(true, Ordering::Release);

        let descriptors = match self.source.discover() {
            Ok(descriptors) => descriptors,
            Err(e) => {
                self.entries.write().clear();
                return Err(e);
            }
        };
        let mut report = ScanReport::default();
        let mut found: HashMap<ServiceId, Arc<dyn ServiceConsumer>> = HashMap::new();
        let mut order: Vec<ServiceId> = Vec::new();

        for descriptor in descriptors {
            let id = descriptor.identifier;
            if id.is_nil() {
                warn!(type_name = %descriptor.type_name, "Skipping consumer with nil identifier");
                report.skipped += 1;
                continue;
            }
            if found.contains_key(&id) {
                warn!(
                    service_id = %id,
                    type_name = %descriptor.type_name,
                    path = %descriptor.binary_location.display(),
                    "Duplicate service identifier, keeping the first registration"
                );
                report.skipped += 1;
                continue;
            }

            let consumer = match self.source.instantiate(&descriptor) {
                Ok(consumer) => consumer,
                Err(e) => {
                    warn!(service_id = %id, error = %e, "Failed to instantiate consumer");
                    report.skipped += 1;
                    continue;
                }
            };
            if consumer.name().is_empty() {
                let err = PluginHostError::Contract {
                    type_name: descriptor.type_name.clone(),
                    reason: "consumer has an empty name".to_string(),
                };
                warn!(service_id = %id, error = %err, "Skipping consumer");
                report.skipped += 1;
                continue;
            }
            if consumer.identifier() != id {
                let err = PluginHostError::Contract {
                    type_name: descriptor.type_name.clone(),
                    reason: format!("instance reports identifier {}", consumer.identifier()),
                };
                warn!(service_id = %id, error = %err, "Skipping consumer");
                report.skipped += 1;
                continue;
            }

            debug!(service_id = %id, name = consumer.name(), "Registered consumer");
            order.push(id);
            found.insert(id, consumer);
        }

        for id in order {
            let Some(consumer) = found.get(&id).cloned() else {
                continue;
            };
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| self.binder.bind(id, consumer.as_ref())));
            let failure = match outcome {
                Ok(Ok(bound)) => {
                    debug!(service_id = %id, outcome = ?bound, "Bound consumer settings");
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };

            let err = PluginHostError::Init {
                service_id: id.to_string(),
                reason: failure,
            };
            error!(service_id = %id, error = %err, "Evicting consumer");
            found.remove(&id);
            report.evicted += 1;
        }

        report.registered = found.len();
        *self.entries.write() = found;

        info!(
            registered = report.registered,
            skipped = report.skipped,
            evicted = report.evicted,
            "Service discovery complete"
        );
        Ok(report)
    }

    /// Removes every consumer. The next lookup scans again.
    pub fn unload_services(&self) {
        let _scan = self.scan_lock.lock();
        self.entries.write().clear();
        self.initialized.store(false, Ordering::Release);
        info!("Unloaded all services");
    }

    fn ensure_initialized(&self) {
        if self.initialized.load(Ordering::Acquire) {
            return;
        }
        let _scan = self.scan_lock.lock();
        if self.initialized.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.scan_locked() {
            error!(error = %e, "Service discovery failed");
        }
    }

    pub fn get(&self, id: ServiceId) -> Option<Arc<dyn ServiceConsumer>> {
        self.ensure_initialized();
        self.entries.read().get(&id).cloned()
    }

    pub fn contains(&self, id: ServiceId) -> bool {
        self.ensure_initialized();
        self.entries.read().contains_key(&id)
    }

    /// All registered consumers, ordered by name.
    pub fn entries(&self) -> Vec<(ServiceId, Arc<dyn ServiceConsumer>)> {
        self.ensure_initialized();
        let mut entries: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(id, consumer)| (*id, Arc::clone(consumer)))
            .collect();
        entries.sort_by(|a, b| a.1.name().cmp(b.1.name()));
        entries
    }

    /// The connect-time configuration descriptor of `id`; empty when unknown.
    pub fn connect_data(&self, id: ServiceId) -> ConfigData {
        self.get(id)
            .map(|consumer| consumer.config_data())
            .unwrap_or_default()
    }

    /// Number of registered consumers, without triggering a scan.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
