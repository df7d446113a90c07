//! Wasmtime-based plugin host for tether.
//!
//! Discovers service consumer modules in a plugin directory, inspects each
//! one inside a disposable engine, then instantiates the survivors in the
//! long-lived host engine and registers them by their stable identifier.
//!
//! Every consumer call runs in its own `wasmtime::Store` with a memory
//! ceiling and a CPU fuel budget.

mod abi;
mod binder;
mod consumer;
mod error;
mod limits;
mod loader;
mod manifest;
mod registry;
mod source;

pub use abi::{HOST_ERROR, HTTP_FORBIDDEN};
pub use binder::{BindOutcome, SettingsBinder};
pub use consumer::{SYNC_FORBIDDEN, SYNC_OK, WasmServiceConsumer};
pub use error::PluginHostError;
pub use limits::ResourceLimits;
pub use loader::{PluginDescriptor, PluginLoader};
pub use manifest::{ConsumerManifest, ManifestEntry};
pub use registry::{ScanReport, ServiceRegistry};
pub use source::{ConsumerSource, WasmConsumerSource};
