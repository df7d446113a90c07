//! Plugin discovery.
//!
//! Every file in the plugin directory is a candidate. Each candidate is read
//! into memory and inspected inside its own throwaway engine and store, which
//! are dropped before the next candidate is looked at. Nothing compiled during
//! inspection is reused by the host.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tether_types::ServiceId;
use tracing::{debug, error, info, warn};
use wasmtime::Module;

use crate::abi::{self, HostState, WASM_MAGIC};
use crate::error::PluginHostError;
use crate::limits::{ResourceLimits, create_engine};
use crate::manifest::{ConsumerManifest, ManifestEntry};

/// A consumer type found during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub identifier: ServiceId,
    pub display_name: String,
    pub binary_location: PathBuf,
    pub type_name: String,
}

/// What inspecting one candidate file produced.
#[derive(Debug)]
pub(crate) enum Inspection {
    /// Not a Wasm module at all.
    NotWasm,
    /// A Wasm module that does not implement the consumer contract.
    NotConsumer(String),
    Consumers(Vec<PluginDescriptor>),
}

/// Scans a directory for consumer modules.
pub struct PluginLoader {
    dir: PathBuf,
    limits: ResourceLimits,
}

impl PluginLoader {
    pub fn new(dir: impl Into<PathBuf>, limits: ResourceLimits) -> Self {
        Self {
            dir: dir.into(),
            limits,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Inspects every file in the plugin directory, in file-name order.
    ///
    /// Individual candidates never abort the scan: they are skipped and
    /// logged according to why they failed.
    pub fn scan(&self) -> Result<Vec<PluginDescriptor>, PluginHostError> {
        let mut candidates: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        candidates.sort();

        let mut descriptors = Vec::new();
        for path in candidates {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.inspect(&path)));
            match outcome {
                Ok(Ok(Inspection::Consumers(found))) => {
                    debug!(path = %path.display(), count = found.len(), "Found consumer types");
                    descriptors.extend(found);
                }
                Ok(Ok(Inspection::NotWasm)) => {
                    debug!(path = %path.display(), "Skipping non-Wasm file");
                }
                Ok(Ok(Inspection::NotConsumer(reason))) => {
                    debug!(path = %path.display(), reason = %reason, "Skipping module without consumer exports");
                }
                Ok(Err(e)) => {
                    warn!(path = %path.display(), error = %e, "Skipping plugin binary");
                }
                Err(_) => {
                    error!(path = %path.display(), "Plugin inspection panicked, skipping");
                }
            }
        }

        info!(
            dir = %self.dir.display(),
            count = descriptors.len(),
            "Plugin scan complete"
        );
        Ok(descriptors)
    }

    pub(crate) fn inspect(&self, path: &Path) -> Result<Inspection, PluginHostError> {
        let bytes = fs::read(path).map_err(|e| PluginHostError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !bytes.starts_with(WASM_MAGIC) {
            return Ok(Inspection::NotWasm);
        }

        let engine = create_engine()?;
        let module = Module::new(&engine, &bytes).map_err(|e| PluginHostError::Load {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        if let Err(reason) = abi::check_contract(&module) {
            return Ok(Inspection::NotConsumer(reason));
        }

        let label = path.display().to_string();
        let linker = abi::host_linker(&engine)?;
        let state = HostState::new(label.clone(), &self.limits, None);
        let mut store = abi::new_store(&engine, state, self.limits.inspection_fuel)?;
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| PluginHostError::Load {
                path: path.to_path_buf(),
                reason: format!("unresolved dependencies: {e:#}"),
            })?;

        let raw = abi::call_manifest(&mut store, &instance).map_err(|e| {
            PluginHostError::PluginCrashed {
                plugin_id: label.clone(),
                message: format!("consumer_manifest() failed: {e:#}"),
            }
        })?;
        let manifest = ConsumerManifest::parse(&raw)?;

        let descriptors = manifest
            .consumers
            .iter()
            .filter_map(|entry| describe(path, entry))
            .collect();
        Ok(Inspection::Consumers(descriptors))
    }
}

fn describe(path: &Path, entry: &ManifestEntry) -> Option<PluginDescriptor> {
    if entry.type_name.is_empty() {
        warn!(path = %path.display(), "Skipping consumer type without a type name");
        return None;
    }
    match entry.service_id() {
        Ok(identifier) => Some(PluginDescriptor {
            identifier,
            display_name: entry.display_name().to_string(),
            binary_location: path.to_path_buf(),
            type_name: entry.type_name.clone(),
        }),
        Err(reason) => {
            let err = PluginHostError::Contract {
                type_name: entry.type_name.clone(),
                reason,
            };
            warn!(path = %path.display(), error = %err, "Skipping consumer type");
            None
        }
    }
}
