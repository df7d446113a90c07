//! Where the registry gets its consumers from.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tether_consumer::ServiceConsumer;
use tracing::debug;
use wasmtime::{Engine, Linker, Module};

use crate::abi::{self, HostState};
use crate::consumer::{WasmRuntime, WasmServiceConsumer};
use crate::error::PluginHostError;
use crate::limits::{ResourceLimits, create_engine};
use crate::loader::{PluginDescriptor, PluginLoader};
use crate::manifest::ConsumerManifest;

/// Discovers consumer types and instantiates them in the host process.
pub trait ConsumerSource: Send + Sync {
    fn discover(&self) -> Result<Vec<PluginDescriptor>, PluginHostError>;

    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
    ) -> Result<Arc<dyn ServiceConsumer>, PluginHostError>;
}

/// Consumers loaded from Wasm modules in a plugin directory.
pub struct WasmConsumerSource {
    loader: PluginLoader,
    engine: Engine,
    linker: Arc<Linker<HostState>>,
    limits: ResourceLimits,
    modules: Mutex<HashMap<PathBuf, Module>>,
}

impl WasmConsumerSource {
    pub fn new(dir: impl Into<PathBuf>, limits: ResourceLimits) -> Result<Self, PluginHostError> {
        let engine = create_engine()?;
        let linker = Arc::new(abi::host_linker(&engine)?);
        Ok(Self {
            loader: PluginLoader::new(dir, limits.clone()),
            engine,
            linker,
            limits,
            modules: Mutex::new(HashMap::new()),
        })
    }

    pub fn plugin_dir(&self) -> &Path {
        self.loader.dir()
    }

    /// Compiles `path` in the host engine, once per scan.
    fn module_for(&self, path: &Path) -> Result<Module, PluginHostError> {
        if let Some(module) = self.modules.lock().get(path) {
            return Ok(module.clone());
        }

        let load_error = |reason: String| PluginHostError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = fs::read(path).map_err(|e| load_error(e.to_string()))?;
        let module = Module::new(&self.engine, &bytes).map_err(|e| load_error(format!("{e:#}")))?;

        debug!(path = %path.display(), "Compiled plugin module in host engine");
        self.modules
            .lock()
            .insert(path.to_path_buf(), module.clone());
        Ok(module)
    }
}

impl ConsumerSource for WasmConsumerSource {
    fn discover(&self) -> Result<Vec<PluginDescriptor>, PluginHostError> {
        self.modules.lock().clear();
        self.loader.scan()
    }

    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
    ) -> Result<Arc<dyn ServiceConsumer>, PluginHostError> {
        let contract_error = |reason: String| PluginHostError::Contract {
            type_name: descriptor.type_name.clone(),
            reason,
        };

        let module = self.module_for(&descriptor.binary_location)?;
        let info = abi::check_contract(&module).map_err(contract_error)?;

        let runtime = Arc::new(WasmRuntime {
            engine: self.engine.clone(),
            module,
            linker: Arc::clone(&self.linker),
            limits: self.limits.clone(),
            label: descriptor.type_name.clone(),
        });

        let raw = runtime
            .call(None, self.limits.inspection_fuel, |store, instance| {
                abi::call_manifest(store, instance)
            })
            .map_err(|e| PluginHostError::PluginCrashed {
                plugin_id: descriptor.type_name.clone(),
                message: format!("consumer_manifest() failed: {e:#}"),
            })?;
        let manifest = ConsumerManifest::parse(&raw)?;

        let (index, entry) = manifest
            .find(&descriptor.type_name)
            .ok_or_else(|| contract_error("type no longer exported".to_string()))?;
        let identifier = entry.service_id().map_err(contract_error)?;
        if identifier != descriptor.identifier {
            return Err(contract_error(format!(
                "identifier changed from {} to {identifier}",
                descriptor.identifier
            )));
        }
        let index = i32::try_from(index).map_err(|_| contract_error("too many consumer types".to_string()))?;

        Ok(Arc::new(WasmServiceConsumer::new(
            identifier,
            index,
            entry.clone(),
            info.has_service_image,
            runtime,
        )))
    }
}
