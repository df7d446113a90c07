//! Error types for the plugin host.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginHostError {
    /// The binary could not be read or compiled.
    #[error("failed to load plugin {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// The module loaded but does not honour the consumer contract.
    #[error("plugin contract violation in {type_name}: {reason}")]
    Contract { type_name: String, reason: String },

    /// Settings binding for an instantiated consumer failed.
    #[error("plugin initialization failed for {service_id}: {reason}")]
    Init { service_id: String, reason: String },

    #[error("wasm compilation error: {0}")]
    Compilation(#[from] wasmtime::Error),

    #[error("plugin crashed: {plugin_id}: {message}")]
    PluginCrashed { plugin_id: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings store error: {0}")]
    Store(#[from] tether_types::StoreError),
}
