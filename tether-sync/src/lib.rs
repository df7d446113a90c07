//! Sync orchestration for tether.
//!
//! This crate drives the per-binding authorization and sync state machine:
//! - [`SyncOrchestrator`]: authorization flow, gated sync runs, outcome
//!   classification and guaranteed bookkeeping
//! - [`FullSyncPolicy`]: the full-versus-partial decision
//! - [`SyncJobRunner`]: polls the job scheduler and runs due syncs
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = SyncOrchestrator::new(registry, bindings, scheduler, data, auth, http)
//!     .with_policy(FullSyncMode::FirstOfMonth.policy());
//! let binding = orchestrator.connect_service(service_id)?;
//! match orchestrator.begin_authorization(binding.id, None).await? {
//!     AuthorizationStep::Redirect(url) => println!("visit {url}"),
//!     AuthorizationStep::AlreadyAuthorized => {}
//! }
//! ```

mod config;
mod error;
mod finalizer;
mod locks;
mod orchestrator;
mod policy;
mod runner;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use orchestrator::{AuthorizationStep, SyncOrchestrator};
pub use policy::{FirstOfMonth, FullSyncMode, FullSyncPolicy, NeverFullSync};
pub use runner::{SyncJobRunner, TickReport};
