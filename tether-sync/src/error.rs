//! Error types for the sync layer.

use tether_consumer::{AuthError, ConsumerError, DataError};
use tether_types::{BindingId, ServiceId, StoreError, SyncState};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No binding with this id, or it is not a service binding.
    #[error("invalid service binding {binding_id}: {reason}")]
    InvalidServiceBinding {
        binding_id: BindingId,
        reason: &'static str,
    },

    /// The binding's service has no registered consumer.
    #[error("no registered consumer for service {0}")]
    UnknownConsumer(ServiceId),

    /// The binding is in a gating state and needs authorization first.
    #[error("sync not permitted for binding {binding_id} in state {state}")]
    SyncNotPermitted {
        binding_id: BindingId,
        state: SyncState,
    },

    /// No usable credential, or the provider rejected it.
    #[error("authorization forbidden: {0}")]
    AuthorizationForbidden(String),

    /// The consumer reported a failure other than forbidden.
    #[error("sync failed: {0}")]
    SyncFailure(#[source] ConsumerError),

    /// The consumer panicked mid-run.
    #[error("sync run aborted: {0}")]
    RunAborted(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("auth flow error: {0}")]
    Auth(#[from] AuthError),

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

impl SyncError {
    /// Whether the next scheduled attempt may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SyncFailure(_) | Self::RunAborted(_) | Self::Store(_) | Self::Data(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gating_and_lookup_failures_are_fatal() {
        let binding_id = BindingId::new();
        assert!(
            !SyncError::SyncNotPermitted {
                binding_id,
                state: SyncState::Off
            }
            .is_retryable()
        );
        assert!(
            !SyncError::InvalidServiceBinding {
                binding_id,
                reason: "not found"
            }
            .is_retryable()
        );
        assert!(!SyncError::AuthorizationForbidden("revoked".into()).is_retryable());
        assert!(SyncError::SyncFailure(ConsumerError::Plugin { code: 3 }).is_retryable());
        assert!(SyncError::RunAborted("panic".into()).is_retryable());
    }
}
