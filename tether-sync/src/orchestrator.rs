//! The authorization-gated sync state machine.
//!
//! ```text
//! Off ──authorize──▶ Unauthorized ⇄ Synchronizing{Partial,Full} ──▶ Success | Unauthorized | Error
//! ```
//!
//! `Off` and `Unauthorized` gate every run. Runs for one binding are
//! serialized by a per-binding lock; runs for different bindings are
//! independent. The lock travels with the run's [`ServiceContext`], so a
//! cancelled run keeps it until the consumer has let go of the context. The
//! final bookkeeping of a run is persisted by a drop guard, so it happens on
//! every exit path including cancellation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Value;
use tether_auth::AuthFlowFactory;
use tether_consumer::{AuthFlow, CallbackParams, DataClient, ServiceConsumer, ServiceContext};
use tether_plugin_host::ServiceRegistry;
use tether_types::{
    BindingId, BindingStore, DEFAULT_RECURRENCE, JobScheduler, ServiceBinding, ServiceId,
    ServiceState, SyncCursor, SyncJob, SyncState,
};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::finalizer::RunFinalizer;
use crate::locks::RunLocks;
use crate::policy::{FullSyncPolicy, NeverFullSync};

/// Held for the whole of a run on one binding.
type RunLease = Arc<OwnedMutexGuard<()>>;

/// Result of starting the authorization flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationStep {
    /// The stored credential already works; a sync job is scheduled.
    AlreadyAuthorized,
    /// The user must visit this provider URL.
    Redirect(String),
}

/// Drives authorization and sync runs for user-service bindings.
pub struct SyncOrchestrator {
    registry: Arc<ServiceRegistry>,
    bindings: Arc<dyn BindingStore>,
    scheduler: Arc<dyn JobScheduler>,
    data: Arc<dyn DataClient>,
    auth: Arc<dyn AuthFlowFactory>,
    http: reqwest::Client,
    policy: Arc<dyn FullSyncPolicy>,
    recurrence: Duration,
    locks: RunLocks,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        bindings: Arc<dyn BindingStore>,
        scheduler: Arc<dyn JobScheduler>,
        data: Arc<dyn DataClient>,
        auth: Arc<dyn AuthFlowFactory>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            registry,
            bindings,
            scheduler,
            data,
            auth,
            http,
            policy: Arc::new(NeverFullSync),
            recurrence: DEFAULT_RECURRENCE,
            locks: RunLocks::default(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn FullSyncPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_recurrence(mut self, recurrence: Duration) -> Self {
        self.recurrence = recurrence;
        self
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn bindings(&self) -> &Arc<dyn BindingStore> {
        &self.bindings
    }

    /// Creates a binding in state `Off` for a registered service.
    pub fn connect_service(&self, service_id: ServiceId) -> SyncResult<ServiceBinding> {
        if !self.registry.contains(service_id) {
            return Err(SyncError::UnknownConsumer(service_id));
        }
        let binding = ServiceBinding::connect(service_id);
        self.bindings.insert(&binding)?;
        info!(binding_id = %binding.id, service_id = %service_id, "Connected service");
        Ok(binding)
    }

    /// Starts authorizing `binding_id`.
    ///
    /// `config` is stored under the consumer's config data type, when it
    /// declares one, before the existing credential is validated.
    pub async fn begin_authorization(
        &self,
        binding_id: BindingId,
        config: Option<Value>,
    ) -> SyncResult<AuthorizationStep> {
        let run = self.lock_run(binding_id).await;
        let (binding, consumer) = self.resolve(binding_id)?;

        if let (Some(config), Some(tag)) = (config, consumer.config_data().config_data_type) {
            self.data.update_singleton(binding_id, &tag, "", config).await?;
            debug!(binding_id = %binding_id, tag = %tag, "Stored connect configuration");
        }

        let flow = self.auth.build(&consumer.settings());
        let ctx = self.context(&binding, Arc::clone(&flow), binding.state.cursor(), &run);
        if consumer.validate_authorization(&ctx).await {
            self.record_authorization(binding_id, true)?;
            return Ok(AuthorizationStep::AlreadyAuthorized);
        }

        let url = flow.authorization_url(binding_id).await?;
        info!(binding_id = %binding_id, flow = %flow.kind(), "Authorization redirect issued");
        Ok(AuthorizationStep::Redirect(url))
    }

    /// Handles the provider redirect for `binding_id`.
    ///
    /// The state is set to `Success` or `Unauthorized` and the next run is
    /// scheduled whatever the outcome. Returns whether the binding ended up
    /// authorized; a failed credential exchange is returned as an error after
    /// the bookkeeping.
    pub async fn complete_authorization(
        &self,
        binding_id: BindingId,
        params: &CallbackParams,
    ) -> SyncResult<bool> {
        let run = self.lock_run(binding_id).await;
        let (binding, consumer) = self.resolve(binding_id)?;

        let flow = self.auth.build(&consumer.settings());
        let credential = match flow.handle_callback(binding_id, params).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(binding_id = %binding_id, error = %e, "Credential exchange failed");
                self.record_authorization(binding_id, false)?;
                return Err(e.into());
            }
        };

        let value = serde_json::to_value(&credential).map_err(tether_consumer::DataError::from)?;
        self.data
            .update_singleton(binding_id, credential.type_tag(), "", value)
            .await?;

        let ctx = self.context(&binding, flow, binding.state.cursor(), &run);
        let authorized = consumer.validate_authorization(&ctx).await;
        self.record_authorization(binding_id, authorized)?;
        Ok(authorized)
    }

    /// Runs one sync for `binding_id` and returns the persisted state.
    pub async fn sync_service(&self, binding_id: BindingId) -> SyncResult<ServiceState> {
        let run = self.lock_run(binding_id).await;
        // Resolved under the lock: a previous run or a rescan may just have
        // changed the binding or its consumer.
        let (binding, consumer) = self.resolve(binding_id)?;
        if binding.state.sync_state.is_gating() {
            return Err(SyncError::SyncNotPermitted {
                binding_id,
                state: binding.state.sync_state,
            });
        }

        let flow = self.auth.build(&consumer.settings());
        let ctx = self.context(&binding, flow, binding.state.cursor(), &run);
        if !consumer.validate_authorization(&ctx).await {
            self.set_state(binding_id, SyncState::Unauthorized)?;
            return Err(SyncError::AuthorizationForbidden(format!(
                "{} rejected the stored credential",
                consumer.name()
            )));
        }

        let full_sync = self.policy.full_sync(&binding.state, Utc::now());
        self.set_state(binding_id, SyncState::synchronizing(full_sync))?;

        let finalizer = RunFinalizer::new(Arc::clone(&self.bindings), binding_id, ctx.cursor_handle());
        let outcome = AssertUnwindSafe(consumer.sync(&ctx, full_sync))
            .catch_unwind()
            .await;

        let (final_state, error) = match outcome {
            Ok(Ok(())) => (SyncState::Success, None),
            Ok(Err(e)) if e.is_forbidden() => (
                SyncState::Unauthorized,
                Some(SyncError::AuthorizationForbidden(e.to_string())),
            ),
            Ok(Err(e)) => (SyncState::Error, Some(SyncError::SyncFailure(e))),
            Err(panic) => (
                SyncState::Error,
                Some(SyncError::RunAborted(panic_message(panic.as_ref()))),
            ),
        };

        let state = finalizer.finish(final_state)?;
        match error {
            Some(e) => Err(e),
            None => Ok(state),
        }
    }

    async fn lock_run(&self, binding_id: BindingId) -> RunLease {
        Arc::new(self.locks.acquire(binding_id).await)
    }

    fn resolve(&self, binding_id: BindingId) -> SyncResult<(ServiceBinding, Arc<dyn ServiceConsumer>)> {
        let binding = self
            .bindings
            .get(binding_id)?
            .ok_or(SyncError::InvalidServiceBinding {
                binding_id,
                reason: "no such binding",
            })?;
        if !binding.is_service() {
            return Err(SyncError::InvalidServiceBinding {
                binding_id,
                reason: "not a service binding",
            });
        }
        let consumer = self
            .registry
            .get(binding.service_id)
            .ok_or(SyncError::UnknownConsumer(binding.service_id))?;
        Ok((binding, consumer))
    }

    fn context(
        &self,
        binding: &ServiceBinding,
        flow: Arc<dyn AuthFlow>,
        cursor: SyncCursor,
        run: &RunLease,
    ) -> ServiceContext {
        ServiceContext::new(
            binding.id,
            binding.service_id,
            Arc::clone(&self.data),
            flow,
            self.http.clone(),
            cursor,
        )
        .with_lease(Arc::clone(run) as Arc<dyn std::any::Any + Send + Sync>)
    }

    fn set_state(&self, binding_id: BindingId, sync_state: SyncState) -> SyncResult<()> {
        self.bindings
            .update_state(binding_id, &mut |state| state.sync_state = sync_state)?;
        info!(binding_id = %binding_id, state = %sync_state, "Sync state changed");
        Ok(())
    }

    /// Persists the authorization outcome and (re)schedules the next run.
    fn record_authorization(&self, binding_id: BindingId, authorized: bool) -> SyncResult<()> {
        let now = Utc::now();
        let job = SyncJob::schedule(binding_id, now, self.recurrence);
        self.scheduler.upsert(&job)?;

        let sync_state = if authorized {
            SyncState::Success
        } else {
            SyncState::Unauthorized
        };
        let due: DateTime<Utc> = job.due_time;
        self.bindings.update_state(binding_id, &mut |state| {
            state.sync_state = sync_state;
            state.next_synchronization_utc = Some(due);
        })?;
        info!(
            binding_id = %binding_id,
            state = %sync_state,
            next_sync = %due,
            "Authorization recorded"
        );
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "consumer panicked".to_string()
    }
}
