//! Per-run context handed to a consumer.

use crate::auth::AuthFlow;
use crate::data::DataClient;
use crate::error::ConsumerError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tether_types::{BindingId, Credential, ServiceId, SyncCursor};
use tracing::debug;

/// Everything a consumer may touch while validating or syncing one binding.
///
/// The cursor is shared with the orchestrator, which persists whatever the
/// consumer last recorded once the run ends.
#[derive(Clone)]
pub struct ServiceContext {
    binding_id: BindingId,
    service_id: ServiceId,
    data: Arc<dyn DataClient>,
    auth: Arc<dyn AuthFlow>,
    http: reqwest::Client,
    cursor: Arc<Mutex<SyncCursor>>,
    lease: Option<Arc<dyn Any + Send + Sync>>,
}

impl ServiceContext {
    pub fn new(
        binding_id: BindingId,
        service_id: ServiceId,
        data: Arc<dyn DataClient>,
        auth: Arc<dyn AuthFlow>,
        http: reqwest::Client,
        cursor: SyncCursor,
    ) -> Self {
        Self {
            binding_id,
            service_id,
            data,
            auth,
            http,
            cursor: Arc::new(Mutex::new(cursor)),
            lease: None,
        }
    }

    /// Ties `lease` to this context: it is released only when the last
    /// clone is dropped, including clones still held by a cancelled call.
    pub fn with_lease(mut self, lease: Arc<dyn Any + Send + Sync>) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn binding_id(&self) -> BindingId {
        self.binding_id
    }

    pub fn service_id(&self) -> ServiceId {
        self.service_id
    }

    pub fn data(&self) -> &Arc<dyn DataClient> {
        &self.data
    }

    pub fn auth(&self) -> &Arc<dyn AuthFlow> {
        &self.auth
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Snapshot of the current resume cursor.
    pub fn cursor(&self) -> SyncCursor {
        self.cursor.lock().clone()
    }

    pub fn set_cursor(&self, current_object: Option<String>, current_date_utc: Option<DateTime<Utc>>) {
        *self.cursor.lock() = SyncCursor::new(current_object, current_date_utc);
    }

    /// Shared handle to the cursor, read by the orchestrator's finalizer.
    pub fn cursor_handle(&self) -> Arc<Mutex<SyncCursor>> {
        Arc::clone(&self.cursor)
    }

    /// The stored access credential for this binding, if any.
    pub async fn credential(&self) -> Result<Option<Credential>, ConsumerError> {
        let tag = self.auth.kind().credential_tag();
        let Some(value) = self.data.get_singleton(self.binding_id, tag).await? else {
            return Ok(None);
        };
        let credential = serde_json::from_value(value)
            .map_err(|e| ConsumerError::Parse(format!("stored credential: {e}")))?;
        Ok(Some(credential))
    }

    /// The stored credential, or `Forbidden` when none is usable.
    pub async fn require_credential(&self) -> Result<Credential, ConsumerError> {
        match self.credential().await? {
            Some(credential) if credential.is_usable(Utc::now()) => Ok(credential),
            _ => Err(ConsumerError::Forbidden("no usable access token".to_string())),
        }
    }

    /// Signed GET against the provider. 401 and 403 map to `Forbidden`.
    pub async fn fetch(&self, url: &str) -> Result<String, ConsumerError> {
        let credential = self.require_credential().await?;
        let request = self.auth.sign_request(self.http.get(url), &credential)?;

        debug!(binding_id = %self.binding_id, url, "Fetching provider resource");
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ConsumerError::Forbidden(format!("provider returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConsumerError::Network(format!("provider returned {status}: {body}")));
        }

        Ok(response.text().await?)
    }
}
