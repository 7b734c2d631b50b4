//! # canopy-sync
//!
//! Compliance synchronization engine between local cultivation records and a
//! state seed-to-sale regulator API.
//!
//! - [`queue::QueueManager`]: durable outbox with day-scoped idempotency,
//!   dependency gating, atomic claims, and classified retries.
//! - [`orchestrator::SyncOrchestrator`]: one active run per license, status,
//!   cancellation, scheduler entry point.
//! - [`checkpoint::CheckpointStore`]: incremental pull and push watermarks.
//! - [`runner::SyncRunner`] and [`worker::QueueWorker`]: execute a run's
//!   pull and push phases and deliver its queue.
//! - [`reconcile::ReconciliationEngine`]: read-only drift report.
//!
//! Regulator wire protocols, payload mapping and local record access are
//! supplied by the caller through the traits in [`collaborators`].

pub mod backoff;
pub mod checkpoint;
pub mod collaborators;
pub mod error;
mod lifecycle;
pub mod orchestrator;
pub mod queue;
pub mod reconcile;
pub mod runner;
pub mod worker;

use std::sync::Arc;

use canopy_config::CanopyConfig;
use canopy_db::service::CanopyService;
use tracing::{info, warn};

pub use backoff::RetryPolicy;
pub use checkpoint::{CheckpointStore, PassOutcome};
pub use collaborators::{
    AdapterRegistry, ApiResponse, ChangeRef, ChangeSource, ComplianceRecord, EntityMapper,
    LocalRecordSource, OutboundChange, RegulatorAdapter, SyncResult,
};
pub use error::{ApiFailure, SyncError};
pub use orchestrator::{StartSyncRequest, SyncOrchestrator};
pub use queue::{EnqueueOutcome, EnqueueRequest, QueueManager};
pub use reconcile::{ReconciliationEngine, ReconciliationReport};
pub use runner::{RunSummary, SyncRunner};
pub use worker::{QueueWorker, WorkerConfig};

/// Caller-supplied integrations.
#[derive(Clone)]
pub struct Collaborators {
    pub adapters: AdapterRegistry,
    pub mapper: Arc<dyn EntityMapper>,
    pub changes: Arc<dyn ChangeSource>,
    pub local_records: Arc<dyn LocalRecordSource>,
}

/// The engine wired together from configuration.
#[derive(Clone)]
pub struct SyncEngine {
    pub orchestrator: SyncOrchestrator,
    pub runner: SyncRunner,
    pub reconciler: ReconciliationEngine,
}

impl SyncEngine {
    pub fn new(service: Arc<CanopyService>, config: &CanopyConfig, collaborators: Collaborators) -> Self {
        let adapters = Arc::new(collaborators.adapters);
        let queue = QueueManager::new(
            Arc::clone(&service),
            RetryPolicy::from_config(&config.retry),
        );
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&service),
            queue.clone(),
            CheckpointStore::new(Arc::clone(&service)),
        );
        let worker = QueueWorker::new(
            Arc::clone(&service),
            queue,
            Arc::clone(&adapters),
            Arc::clone(&collaborators.mapper),
            WorkerConfig::from_config(&config.sync),
        );
        let runner = SyncRunner::new(
            orchestrator.clone(),
            Arc::clone(&adapters),
            collaborators.mapper,
            collaborators.changes,
            worker,
            config.sync.entity_types.clone(),
        );
        let reconciler = ReconciliationEngine::new(
            service,
            adapters,
            collaborators.local_records,
            config.reconciliation.clone(),
        );
        Self {
            orchestrator,
            runner,
            reconciler,
        }
    }

    /// Start a run and execute it to completion.
    ///
    /// An active run left behind by a crash, an aborted process, or a caller
    /// without a runner is picked up and resumed. `None` only when this
    /// process is already executing the license's run.
    pub async fn sync(&self, request: StartSyncRequest) -> Result<Option<RunSummary>, SyncError> {
        let started = self.orchestrator.start_sync(request).await?;
        if !started.created {
            if self.orchestrator.is_running_here(&started.job.id) {
                return Ok(None);
            }
            info!(
                job_id = %started.job.id,
                license = %started.job.license_number,
                "resuming active sync job"
            );
        }
        self.runner.try_run_job(&started.job).await
    }

    /// Execute every active job this process is not already running, oldest
    /// first. Hosts call this on startup and after jobs are started by
    /// processes without a runner, such as the `canopy` CLI.
    ///
    /// A job that fails to run is logged and the rest still run.
    pub async fn resume_active_jobs(&self) -> Result<Vec<RunSummary>, SyncError> {
        let mut summaries = Vec::new();
        for job in self.orchestrator.get_active_sync_jobs().await? {
            if self.orchestrator.is_running_here(&job.id) {
                continue;
            }
            info!(job_id = %job.id, license = %job.license_number, "resuming active sync job");
            match self.runner.try_run_job(&job).await {
                Ok(Some(summary)) => summaries.push(summary),
                Ok(None) | Err(SyncError::Cancelled) => {}
                Err(e) => warn!(job_id = %job.id, error = %e, "resumed sync job did not run"),
            }
        }
        Ok(summaries)
    }
}
