//! Persistence collaborators for tether.
//!
//! Two families of implementations of the collaborator traits:
//! - SQLite-backed stores sharing one [`Database`] connection
//! - In-memory stores for tests and ephemeral hosts
//!
//! # Tables
//!
//! - `service_settings`: authorization settings per service id
//! - `service_bindings`: user-service bindings and their sync state
//! - `sync_jobs`: scheduled sync jobs, one per binding
//! - `singletons`: destination data written by consumers

mod bindings;
mod data;
mod db;
mod error;
mod jobs;
mod memory;
mod settings;

pub use bindings::SqliteBindingStore;
pub use data::SqliteDataClient;
pub use db::Database;
pub use error::{StorageError, StorageResult};
pub use jobs::SqliteJobScheduler;
pub use memory::{MemoryBindingStore, MemoryDataClient, MemoryJobScheduler, MemorySettingsStore};
pub use settings::SqliteSettingsStore;
