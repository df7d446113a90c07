//! Engine configuration and per-store resource budgets.

use crate::error::PluginHostError;
use serde::{Deserialize, Serialize};
use wasmtime::{Engine, StoreLimits, StoreLimitsBuilder};

/// Resource limits applied to every plugin store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum linear memory in bytes.
    pub max_memory_bytes: usize,
    /// CPU fuel budget per consumer call (prevents infinite loops).
    pub fuel_per_call: u64,
    /// Fuel budget for producing the manifest during inspection.
    pub inspection_fuel: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: 32 * 1024 * 1024, // 32MB
            fuel_per_call: 500_000_000,
            inspection_fuel: 10_000_000,
        }
    }
}

impl ResourceLimits {
    pub(crate) fn store_limits(&self) -> StoreLimits {
        StoreLimitsBuilder::new()
            .memory_size(self.max_memory_bytes)
            .instances(1)
            .build()
    }
}

/// Creates a Wasmtime engine configured for plugin sandboxing.
pub(crate) fn create_engine() -> Result<Engine, PluginHostError> {
    let mut config = wasmtime::Config::new();
    config.consume_fuel(true);
    config.epoch_interruption(true);
    Engine::new(&config).map_err(PluginHostError::Compilation)
}
