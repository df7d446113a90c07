//! Error types seen by service consumers and their collaborators.

use thiserror::Error;

/// Errors raised by a consumer's `sync` entry point.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// No usable access credential, or the provider rejected it.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Transport-level failure talking to the provider.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered with something the consumer could not parse.
    #[error("parse error: {0}")]
    Parse(String),

    /// Destination data client failure.
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// Auth-flow manager failure while signing a request.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Plugin-defined failure code.
    #[error("plugin reported failure code {code}")]
    Plugin { code: i32 },

    /// The plugin trapped or panicked mid-call.
    #[error("plugin crashed: {0}")]
    Crashed(String),

    #[error("{0}")]
    Other(String),
}

impl ConsumerError {
    /// Forbidden failures move the binding to `Unauthorized` instead of `Error`.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

impl From<reqwest::Error> for ConsumerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Errors raised by the destination data client.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("data store error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by an auth-flow manager.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("network error: {0}")]
    Network(String),

    /// The provider's endpoint answered with a non-success status.
    #[error("endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("callback is missing `{0}`")]
    MissingParameter(&'static str),

    /// The user declined, or the provider reported an error on the callback.
    #[error("authorization denied: {0}")]
    Denied(String),

    /// No pending request token for this binding.
    #[error("no pending request token")]
    RequestTokenMissing,

    /// The credential does not belong to this flow's variant.
    #[error("credential does not match the {0} flow")]
    CredentialMismatch(&'static str),

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
