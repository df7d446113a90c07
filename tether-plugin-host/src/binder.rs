//! Reconciles consumer settings with the persisted settings store.

use std::sync::Arc;

use tether_consumer::ServiceConsumer;
use tether_types::{ServiceId, SettingsStore};
use tracing::{debug, info};

use crate::error::PluginHostError;

/// How a consumer's settings were bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// Persisted settings of the right variant were assigned.
    Restored,
    /// Nothing usable was persisted; the consumer's defaults were saved.
    Defaulted,
}

pub struct SettingsBinder {
    store: Arc<dyn SettingsStore>,
}

impl SettingsBinder {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Assigns persisted settings onto `consumer`, or persists its defaults
    /// when none exist or the persisted variant differs.
    pub fn bind(
        &self,
        id: ServiceId,
        consumer: &dyn ServiceConsumer,
    ) -> Result<BindOutcome, PluginHostError> {
        let default = consumer.default_settings();
        match self.store.get(id)? {
            Some(persisted) if persisted.same_variant(&default) => {
                consumer.set_settings(persisted);
                debug!(service_id = %id, "Restored persisted settings");
                Ok(BindOutcome::Restored)
            }
            persisted => {
                if let Some(stale) = persisted {
                    info!(
                        service_id = %id,
                        persisted = stale.variant_name(),
                        default = default.variant_name(),
                        "Persisted settings variant differs, replacing with defaults"
                    );
                }
                self.store.put(id, &default)?;
                consumer.set_settings(default);
                Ok(BindOutcome::Defaulted)
            }
        }
    }
}
