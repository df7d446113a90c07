//! Host wiring for the tether daemon.
//!
//! [`Tether::open`] opens the database and wires the stores, the plugin
//! source, the registry and the orchestrator. [`Tether::scan`] registers the
//! consumers found in the plugin directory and binds their settings; the
//! registry also scans lazily on first lookup.

pub mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tether_auth::DefaultAuthFlowFactory;
use tether_consumer::{CallbackParams, DataClient};
use tether_plugin_host::{ScanReport, ServiceRegistry, WasmConsumerSource};
use tether_storage::{
    Database, SqliteBindingStore, SqliteDataClient, SqliteJobScheduler, SqliteSettingsStore,
};
use tether_sync::{AuthorizationStep, SyncJobRunner, SyncOrchestrator};
use tether_types::{BindingId, BindingStore, JobScheduler, ServiceBinding, ServiceId, ServiceState};
use tracing::info;

pub use config::{HttpConfig, TetherConfig};

/// One registered consumer, as listed by `tetherd services`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSummary {
    pub id: ServiceId,
    pub name: String,
    pub title: String,
    pub data_types: Vec<String>,
}

pub struct Tether {
    config: TetherConfig,
    registry: Arc<ServiceRegistry>,
    bindings: Arc<dyn BindingStore>,
    scheduler: Arc<dyn JobScheduler>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl Tether {
    pub fn open(config: TetherConfig) -> Result<Self> {
        let db = Database::open(&config.database_path)
            .with_context(|| format!("opening database {}", config.database_path.display()))?;
        let http = config.http.client()?;

        let source = WasmConsumerSource::new(&config.plugin_dir, config.sandbox.clone())
            .context("creating plugin engine")?;
        let registry = Arc::new(ServiceRegistry::new(
            Arc::new(source),
            Arc::new(SqliteSettingsStore::new(db.clone())),
        ));
        let bindings: Arc<dyn BindingStore> = Arc::new(SqliteBindingStore::new(db.clone()));
        let scheduler: Arc<dyn JobScheduler> = Arc::new(SqliteJobScheduler::new(db.clone()));
        let data: Arc<dyn DataClient> = Arc::new(SqliteDataClient::new(db));
        let auth = Arc::new(DefaultAuthFlowFactory::new(http.clone(), Arc::clone(&data)));

        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&bindings),
            Arc::clone(&scheduler),
            data,
            auth,
            http,
        )
        .with_policy(config.sync.full_sync.policy())
        .with_recurrence(config.sync.recurrence());

        Ok(Self {
            config,
            registry,
            bindings,
            scheduler,
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Rescans the plugin directory.
    pub fn scan(&self) -> Result<ScanReport> {
        self.registry
            .find_services()
            .with_context(|| format!("scanning {}", self.config.plugin_dir.display()))
    }

    pub fn services(&self) -> Vec<ServiceSummary> {
        self.registry
            .entries()
            .into_iter()
            .map(|(id, consumer)| ServiceSummary {
                id,
                name: consumer.name().to_string(),
                title: consumer.title().to_string(),
                data_types: consumer
                    .data_type_references()
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect(),
            })
            .collect()
    }

    pub fn bindings(&self) -> Result<Vec<ServiceBinding>> {
        Ok(self.bindings.list()?)
    }

    pub fn connect(&self, service_id: ServiceId) -> Result<ServiceBinding> {
        Ok(self.orchestrator.connect_service(service_id)?)
    }

    pub async fn authorize(&self, binding_id: BindingId, config: Option<Value>) -> Result<AuthorizationStep> {
        Ok(self.orchestrator.begin_authorization(binding_id, config).await?)
    }

    /// Completes authorization from the raw redirect query string.
    pub async fn callback(&self, binding_id: BindingId, query: &str) -> Result<bool> {
        let params = CallbackParams::from_query(query);
        Ok(self.orchestrator.complete_authorization(binding_id, &params).await?)
    }

    pub async fn sync(&self, binding_id: BindingId) -> Result<ServiceState> {
        Ok(self.orchestrator.sync_service(binding_id).await?)
    }

    /// Runs scheduled syncs until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        let runner = Arc::new(SyncJobRunner::new(
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.scheduler),
            self.config.sync.poll_interval(),
        ));
        let handle = runner.start();
        shutdown.await;
        handle.abort();
        info!("Sync job runner stopped");
        Ok(())
    }
}
