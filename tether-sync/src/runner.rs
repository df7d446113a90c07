//! Polling job runner.
//!
//! Asks the scheduler for due jobs on every tick, reschedules each by its
//! recurrence and runs the syncs concurrently. Failures are logged and never
//! stop the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tether_types::{JobScheduler, SyncJob};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::SyncOrchestrator;

/// Outcome counts of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct SyncJobRunner {
    orchestrator: Arc<SyncOrchestrator>,
    scheduler: Arc<dyn JobScheduler>,
    poll_interval: Duration,
}

impl SyncJobRunner {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        scheduler: Arc<dyn JobScheduler>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            scheduler,
            poll_interval,
        }
    }

    /// Spawns the polling loop. It runs until the task is aborted.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_s = self.poll_interval.as_secs(), "Sync job runner started");
            let mut interval = tokio::time::interval(self.poll_interval.max(Duration::from_millis(1)));
            loop {
                interval.tick().await;
                if let Err(e) = self.tick(Utc::now()).await {
                    error!(error = %e, "Sync job runner tick failed");
                }
            }
        })
    }

    /// Runs every job due at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> SyncResult<TickReport> {
        let jobs = self.scheduler.due(now)?;
        if jobs.is_empty() {
            return Ok(TickReport::default());
        }
        debug!(count = jobs.len(), "Running due sync jobs");

        for job in &jobs {
            self.scheduler.upsert(&job.rescheduled(now))?;
        }

        let results = join_all(jobs.iter().map(|job| self.run_job(job))).await;
        let mut report = TickReport {
            due: jobs.len(),
            ..Default::default()
        };
        for ok in results {
            if ok {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        info!(
            due = report.due,
            succeeded = report.succeeded,
            failed = report.failed,
            "Sync job tick complete"
        );
        Ok(report)
    }

    async fn run_job(&self, job: &SyncJob) -> bool {
        let binding_id = job.target_id;
        match self.orchestrator.sync_service(binding_id).await {
            Ok(state) => {
                debug!(binding_id = %binding_id, state = %state.sync_state, "Scheduled sync succeeded");
                true
            }
            Err(e @ SyncError::InvalidServiceBinding { .. }) => {
                warn!(binding_id = %binding_id, error = %e, "Dropping job for missing binding");
                if let Err(e) = self.scheduler.remove(binding_id) {
                    error!(binding_id = %binding_id, error = %e, "Failed to remove job");
                }
                false
            }
            Err(e) if e.is_retryable() => {
                error!(binding_id = %binding_id, error = %e, "Scheduled sync failed, will retry");
                false
            }
            Err(e) => {
                warn!(binding_id = %binding_id, error = %e, "Scheduled sync needs attention");
                false
            }
        }
    }
}
