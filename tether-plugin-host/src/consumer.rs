//! Host-side service consumer backed by a compiled Wasm module.
//!
//! Every call gets a fresh store and instance in the shared host engine, so
//! no guest state survives between calls and runs for different bindings
//! never contend on a store. Calls execute on the blocking pool; host
//! imports re-enter the async runtime through the captured handle.
//!
//! Dropping a call's future cancels the guest: host imports trap from then
//! on and the engine epoch is bumped so a guest busy in its own code traps at
//! its next epoch check. The blocking task keeps its clone of the
//! [`ServiceContext`] (and any lease on it) until the guest has stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tether_consumer::{
    ConfigData, ConsumerError, DataTypeReference, ImageData, ServiceConsumer, ServiceContext,
    SettingsSlot,
};
use tether_types::{AuthSettings, ServiceId};
use tokio::runtime::Handle;
use tracing::{debug, warn};
use wasmtime::{Engine, Instance, Linker, Module, Store};

use crate::abi::{self, CallScope, HostState};
use crate::limits::ResourceLimits;
use crate::manifest::ManifestEntry;

/// Guest `sync` status for success.
pub const SYNC_OK: i32 = 0;
/// Guest `sync` status for a missing or rejected credential.
pub const SYNC_FORBIDDEN: i32 = 1;

/// Everything needed to instantiate one module in the host engine.
pub(crate) struct WasmRuntime {
    pub engine: Engine,
    pub module: Module,
    pub linker: Arc<Linker<HostState>>,
    pub limits: ResourceLimits,
    pub label: String,
}

impl WasmRuntime {
    /// Runs `f` against a fresh instance with `fuel` units of budget.
    pub fn call<R>(
        &self,
        scope: Option<CallScope>,
        fuel: u64,
        f: impl FnOnce(&mut Store<HostState>, &Instance) -> wasmtime::Result<R>,
    ) -> wasmtime::Result<R> {
        let state = HostState::new(self.label.clone(), &self.limits, scope);
        let mut store = abi::new_store(&self.engine, state, fuel)?;
        let instance = self.linker.instantiate(&mut store, &self.module)?;
        f(&mut store, &instance)
    }
}

/// A [`ServiceConsumer`] whose behaviour lives in a Wasm module.
pub struct WasmServiceConsumer {
    identifier: ServiceId,
    index: i32,
    entry: ManifestEntry,
    data_types: Vec<DataTypeReference>,
    has_service_image: bool,
    settings: SettingsSlot,
    runtime: Arc<WasmRuntime>,
}

impl WasmServiceConsumer {
    pub(crate) fn new(
        identifier: ServiceId,
        index: i32,
        entry: ManifestEntry,
        has_service_image: bool,
        runtime: Arc<WasmRuntime>,
    ) -> Self {
        let data_types = entry
            .data_types
            .iter()
            .map(DataTypeReference::new)
            .collect();
        Self {
            identifier,
            index,
            settings: SettingsSlot::new(entry.default_settings.clone()),
            data_types,
            has_service_image,
            entry,
            runtime,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.entry.type_name
    }

    async fn call_guest<R: Send + 'static>(
        &self,
        ctx: &ServiceContext,
        f: impl FnOnce(&mut Store<HostState>, &Instance) -> wasmtime::Result<R> + Send + 'static,
    ) -> Result<R, ConsumerError> {
        let handle = Handle::try_current().map_err(|e| ConsumerError::Crashed(e.to_string()))?;
        let cancelled = Arc::new(AtomicBool::new(false));
        let scope = CallScope {
            ctx: ctx.clone(),
            handle,
            cancelled: Arc::clone(&cancelled),
        };
        let runtime = Arc::clone(&self.runtime);
        let fuel = runtime.limits.fuel_per_call;
        let guard = CancelOnDrop {
            cancelled,
            engine: runtime.engine.clone(),
            armed: true,
        };

        let joined = tokio::task::spawn_blocking(move || runtime.call(Some(scope), fuel, f)).await;
        guard.disarm();
        joined
            .map_err(|e| ConsumerError::Crashed(format!("plugin call aborted: {e}")))?
            .map_err(|e| ConsumerError::Crashed(format!("{e:#}")))
    }
}

/// Cancels the guest when the awaiting future is dropped mid-call.
struct CancelOnDrop {
    cancelled: Arc<AtomicBool>,
    engine: Engine,
    armed: bool,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.store(true, Ordering::SeqCst);
            self.engine.increment_epoch();
            debug!("Cancelled in-flight plugin call");
        }
    }
}

#[async_trait]
impl ServiceConsumer for WasmServiceConsumer {
    fn identifier(&self) -> ServiceId {
        self.identifier
    }

    fn name(&self) -> &str {
        &self.entry.name
    }

    fn title(&self) -> &str {
        &self.entry.title
    }

    fn description(&self) -> &str {
        &self.entry.description
    }

    fn data_type_references(&self) -> &[DataTypeReference] {
        &self.data_types
    }

    fn config_data(&self) -> ConfigData {
        self.entry.config_data.clone()
    }

    fn default_settings(&self) -> AuthSettings {
        self.settings.default_settings()
    }

    fn settings(&self) -> AuthSettings {
        self.settings.get()
    }

    fn set_settings(&self, settings: AuthSettings) {
        self.settings.set(settings);
    }

    async fn validate_authorization(&self, ctx: &ServiceContext) -> bool {
        let index = self.index;
        let result = self
            .call_guest(ctx, move |store, instance| {
                let validate =
                    instance.get_typed_func::<i32, i32>(&mut *store, "validate_authorization")?;
                validate.call(&mut *store, index)
            })
            .await;

        match result {
            Ok(authorized) => authorized != 0,
            Err(e) => {
                warn!(
                    service_id = %self.identifier,
                    binding_id = %ctx.binding_id(),
                    error = %e,
                    "validate_authorization failed"
                );
                false
            }
        }
    }

    async fn sync(&self, ctx: &ServiceContext, full_sync: bool) -> Result<(), ConsumerError> {
        let index = self.index;
        let full = i32::from(full_sync);
        let status = self
            .call_guest(ctx, move |store, instance| {
                let sync = instance.get_typed_func::<(i32, i32), i32>(&mut *store, "sync")?;
                sync.call(&mut *store, (index, full))
            })
            .await?;

        match status {
            SYNC_OK => Ok(()),
            SYNC_FORBIDDEN => Err(ConsumerError::Forbidden(format!(
                "{} reported a missing or rejected credential",
                self.entry.type_name
            ))),
            code => Err(ConsumerError::Plugin { code }),
        }
    }

    fn service_image(&self, width: u32, height: u32) -> ImageData {
        if !self.has_service_image {
            return ImageData::empty();
        }
        let index = self.index;
        let width = i32::try_from(width).unwrap_or(i32::MAX);
        let height = i32::try_from(height).unwrap_or(i32::MAX);

        let result = self
            .runtime
            .call(None, self.runtime.limits.fuel_per_call, |store, instance| {
                let image = instance
                    .get_typed_func::<(i32, i32, i32), i64>(&mut *store, "service_image")?;
                let packed = image.call(&mut *store, (index, width, height))?;
                if packed <= 0 {
                    return Ok(Vec::new());
                }
                abi::read_packed(store, instance, packed)
            });

        match result {
            Ok(bytes) if !bytes.is_empty() => ImageData {
                mime_type: self
                    .entry
                    .image_mime_type
                    .clone()
                    .unwrap_or_else(|| "image/png".to_string()),
                bytes,
            },
            Ok(_) => ImageData::empty(),
            Err(e) => {
                warn!(service_id = %self.identifier, error = %e, "service_image failed");
                ImageData::empty()
            }
        }
    }
}
