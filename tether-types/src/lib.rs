//! Core type definitions for tether.
//!
//! This crate defines the plugin-agnostic types shared by the host:
//! - Service and binding identifiers
//! - The per-binding sync state machine values
//! - Authorization settings and access credentials
//! - Persistence collaborator traits (settings, bindings, job scheduling)
//!
//! Provider-specific payloads belong in the consumer plugins, not here.

mod credential;
mod ids;
mod settings;
mod state;
mod store;

pub use credential::{
    Credential, OAUTH1_CREDENTIAL_TAG, OAUTH1_REQUEST_TOKEN_TAG, OAUTH2_CREDENTIAL_TAG,
    PendingRequestToken,
};
pub use ids::{BindingId, ServiceId};
pub use settings::{AuthSettings, OAuth1Settings, OAuth2Settings};
pub use state::{BindingKind, ServiceBinding, ServiceState, SyncCursor, SyncState};
pub use store::{
    BindingStore, DEFAULT_RECURRENCE, JobScheduler, SettingsStore, StoreError, StoreResult,
    SyncJob, advance,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid sync state: {0}")]
    InvalidSyncState(String),

    #[error("invalid binding kind: {0}")]
    InvalidBindingKind(String),
}
