//! Sync runner: executes one job's pull and push phases, then drains its queue.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use canopy_core::entities::SyncJob;
use canopy_core::enums::{EntityType, SyncDirection, SyncJobStatus};

use crate::checkpoint::CheckpointStore;
use crate::collaborators::{
    AdapterRegistry, ChangeRef, ChangeSource, EntityMapper, OutboundChange, RegulatorAdapter,
};
use crate::error::SyncError;
use crate::orchestrator::SyncOrchestrator;
use crate::queue::{EnqueueRequest, QueueManager};
use crate::worker::{DrainSummary, QueueWorker};

/// Result of one entity type's pull or push pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub entity_type: EntityType,
    pub direction: SyncDirection,
    /// No watermark was available, so everything was read.
    pub full: bool,
    pub record_count: u32,
    /// Pull: records new locally. Push: items newly enqueued.
    pub created: u32,
    /// Pull: existing records that changed. Push: changes already in flight.
    pub updated: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseFailure {
    pub entity_type: EntityType,
    pub direction: SyncDirection,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// The job as it stood when the run returned.
    pub job: SyncJob,
    pub phases: Vec<PhaseReport>,
    pub failures: Vec<PhaseFailure>,
    pub drain: Option<DrainSummary>,
}

#[derive(Clone)]
pub struct SyncRunner {
    orchestrator: SyncOrchestrator,
    adapters: Arc<AdapterRegistry>,
    mapper: Arc<dyn EntityMapper>,
    changes: Arc<dyn ChangeSource>,
    worker: QueueWorker,
    entity_types: Vec<EntityType>,
}

impl SyncRunner {
    pub fn new(
        orchestrator: SyncOrchestrator,
        adapters: Arc<AdapterRegistry>,
        mapper: Arc<dyn EntityMapper>,
        changes: Arc<dyn ChangeSource>,
        worker: QueueWorker,
        entity_types: Vec<EntityType>,
    ) -> Self {
        Self {
            orchestrator,
            adapters,
            mapper,
            changes,
            worker,
            entity_types,
        }
    }

    fn queue(&self) -> &QueueManager {
        self.orchestrator.queue()
    }

    fn checkpoints(&self) -> &CheckpointStore {
        self.orchestrator.checkpoints()
    }

    /// Run a started job to the end of its queue.
    ///
    /// A failing entity type is recorded on its checkpoint and does not stop
    /// the others. The job fails only when every attempted phase failed, or
    /// when a database error aborts the run. A job already sealed by an
    /// earlier, interrupted run resumes at its drain.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the job was cancelled before the run began,
    /// `Validation` if it finished otherwise, `InvalidState` if this process
    /// is already running it. Database errors abort the run.
    pub async fn run_job(&self, job: &SyncJob) -> Result<RunSummary, SyncError> {
        self.try_run_job(job).await?.ok_or_else(|| {
            SyncError::InvalidState(format!("sync job {} is already running here", job.id))
        })
    }

    /// [`Self::run_job`], returning `None` instead of an error when this
    /// process is already running the job.
    pub async fn try_run_job(&self, job: &SyncJob) -> Result<Option<RunSummary>, SyncError> {
        let Some(_run) = self.orchestrator.begin_run(&job.id) else {
            return Ok(None);
        };
        let job = self.orchestrator.get_sync_job(&job.id).await?;
        match job.status {
            SyncJobStatus::Cancelled => return Err(SyncError::Cancelled),
            status if status.is_terminal() => {
                return Err(SyncError::Validation(format!(
                    "sync job {} is {status}",
                    job.id
                )));
            }
            _ => {}
        }

        let token = self.orchestrator.cancellation_token(&job.id);
        match self.execute(&job, &token).await {
            Err(e @ SyncError::Database(_)) => {
                self.abort(&job, &e).await;
                Err(e)
            }
            result => result.map(Some),
        }
    }

    async fn execute(&self, job: &SyncJob, token: &CancellationToken) -> Result<RunSummary, SyncError> {
        let mut phases = Vec::new();
        let mut failures = Vec::new();

        if job.sealed {
            info!(job_id = %job.id, "resuming sealed sync job at its drain");
        } else {
            self.run_phases(job, token, &mut phases, &mut failures).await?;
            if token.is_cancelled() {
                return self.summary(job, phases, failures, None).await;
            }
            if phases.is_empty() && !failures.is_empty() {
                let message = format!(
                    "every sync phase failed; first error: {}",
                    failures[0].error
                );
                self.orchestrator.fail_job(&job.id, &message).await?;
                return self.summary(job, phases, failures, None).await;
            }
            self.orchestrator.seal_job(&job.id).await?;
        }

        let drain = self.worker.drain(job, token).await?;
        self.summary(job, phases, failures, Some(drain)).await
    }

    async fn run_phases(
        &self,
        job: &SyncJob,
        token: &CancellationToken,
        phases: &mut Vec<PhaseReport>,
        failures: &mut Vec<PhaseFailure>,
    ) -> Result<(), SyncError> {
        if job.direction.includes_pull() {
            for &entity_type in &self.entity_types {
                let Some(adapter) = self.adapters.get(entity_type) else {
                    debug!(entity_type = %entity_type, "no adapter, pull skipped");
                    continue;
                };
                if !self.still_running(&job.id, token).await? {
                    return Ok(());
                }
                match self.pull_entity(job, entity_type, adapter.as_ref(), token).await {
                    Ok(report) => phases.push(report),
                    Err(SyncError::Cancelled) => return Ok(()),
                    Err(e @ SyncError::Database(_)) => return Err(e),
                    Err(e) => {
                        self.record_phase_failure(job, entity_type, SyncDirection::Pull, &e, failures)
                            .await?;
                    }
                }
            }
        }

        if job.direction.includes_push() {
            let mut scanned = HashMap::new();
            for &entity_type in &self.entity_types {
                if !self.still_running(&job.id, token).await? {
                    return Ok(());
                }
                match self.push_entity(job, entity_type, &mut scanned).await {
                    Ok(report) => phases.push(report),
                    Err(e @ SyncError::Database(_)) => return Err(e),
                    Err(e) => {
                        self.record_phase_failure(job, entity_type, SyncDirection::Push, &e, failures)
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `false` once the job was cancelled here or finished by anyone else.
    /// A job found finished also cancels the local token.
    async fn still_running(&self, job_id: &str, token: &CancellationToken) -> Result<bool, SyncError> {
        if token.is_cancelled() {
            return Ok(false);
        }
        let current = self.orchestrator.get_sync_job(job_id).await?;
        if current.status.is_terminal() {
            debug!(job_id, status = %current.status, "job finished elsewhere, run stops");
            token.cancel();
            return Ok(false);
        }
        Ok(true)
    }

    /// Fail a job whose run cannot continue, so its license is free again.
    async fn abort(&self, job: &SyncJob, cause: &SyncError) {
        let message = format!("sync run aborted: {cause}");
        match self.orchestrator.fail_job(&job.id, &message).await {
            Ok(_) => warn!(job_id = %job.id, error = %cause, "sync run aborted"),
            Err(e) => error!(
                job_id = %job.id,
                error = %cause,
                fail_error = %e,
                "sync run aborted and the job could not be failed"
            ),
        }
    }

    async fn pull_entity(
        &self,
        job: &SyncJob,
        entity_type: EntityType,
        adapter: &dyn RegulatorAdapter,
        token: &CancellationToken,
    ) -> Result<PhaseReport, SyncError> {
        let license = job.license_number.as_str();
        let started = Utc::now();
        let watermark = self
            .checkpoints()
            .get(license, entity_type, SyncDirection::Pull)
            .await?
            .and_then(|cp| cp.watermark());

        let fetch = async {
            match watermark {
                Some(since) => adapter.get_changed_since(license, since).await,
                None => adapter.get_active(license).await,
            }
        };
        let records = tokio::select! {
            () = token.cancelled() => return Err(SyncError::Cancelled),
            records = fetch => records?,
        };

        let mut created = 0;
        let mut updated = 0;
        for record in &records {
            let result = self.mapper.apply_remote(license, entity_type, record).await?;
            if result.is_new {
                created += 1;
            } else if result.has_changes {
                updated += 1;
            }
        }

        let record_count = u32::try_from(records.len()).unwrap_or(u32::MAX);
        self.checkpoints()
            .record_success(license, entity_type, SyncDirection::Pull, started, record_count)
            .await?;
        info!(
            job_id = %job.id,
            entity_type = %entity_type,
            full = watermark.is_none(),
            record_count,
            created,
            updated,
            "pull phase finished"
        );
        Ok(PhaseReport {
            entity_type,
            direction: SyncDirection::Pull,
            full: watermark.is_none(),
            record_count,
            created,
            updated,
        })
    }

    /// Enqueue local changes since the push watermark. `scanned` maps changes
    /// seen earlier in this run to their items, for dependency resolution.
    async fn push_entity(
        &self,
        job: &SyncJob,
        entity_type: EntityType,
        scanned: &mut HashMap<ChangeRef, String>,
    ) -> Result<PhaseReport, SyncError> {
        let license = job.license_number.as_str();
        let started = Utc::now();
        let watermark = self
            .checkpoints()
            .get(license, entity_type, SyncDirection::Push)
            .await?
            .and_then(|cp| cp.watermark());
        let changes = self
            .changes
            .changes_since(license, entity_type, watermark)
            .await?;

        let mut created = 0;
        let mut updated = 0;
        for change in &changes {
            let depends_on = self.resolve_dependency(job, change, scanned).await?;
            let request = EnqueueRequest::new(
                &job.id,
                change.entity_type,
                change.operation_type,
                &change.local_entity_id,
                change.payload.clone(),
            )
            .priority(change.priority)
            .remote(change.remote_id.clone(), change.remote_label.clone())
            .depends_on(depends_on);
            let outcome = self.queue().enqueue(request).await?;
            if outcome.created {
                created += 1;
            } else {
                updated += 1;
            }
            scanned.insert(change.change_ref(), outcome.item.id);
        }

        let record_count = u32::try_from(changes.len()).unwrap_or(u32::MAX);
        self.checkpoints()
            .record_success(license, entity_type, SyncDirection::Push, started, record_count)
            .await?;
        info!(
            job_id = %job.id,
            entity_type = %entity_type,
            record_count,
            enqueued = created,
            "push phase finished"
        );
        Ok(PhaseReport {
            entity_type,
            direction: SyncDirection::Push,
            full: watermark.is_none(),
            record_count,
            created,
            updated,
        })
    }

    /// Item id of the change's predecessor: from this scan, else the one
    /// still in flight today. `None` when the predecessor is already
    /// delivered or was never queued.
    async fn resolve_dependency(
        &self,
        job: &SyncJob,
        change: &OutboundChange,
        scanned: &HashMap<ChangeRef, String>,
    ) -> Result<Option<String>, SyncError> {
        let Some(dep) = &change.depends_on else {
            return Ok(None);
        };
        if let Some(id) = scanned.get(dep) {
            return Ok(Some(id.clone()));
        }
        let in_flight = self
            .queue()
            .find_in_flight(
                &job.license_number,
                dep.entity_type,
                &dep.local_entity_id,
                dep.operation_type,
                Utc::now(),
            )
            .await?;
        if in_flight.is_none() {
            debug!(
                local_entity_id = %change.local_entity_id,
                predecessor = %dep.local_entity_id,
                "predecessor not in flight, enqueued without dependency"
            );
        }
        Ok(in_flight.map(|item| item.id))
    }

    async fn record_phase_failure(
        &self,
        job: &SyncJob,
        entity_type: EntityType,
        direction: SyncDirection,
        error: &SyncError,
        failures: &mut Vec<PhaseFailure>,
    ) -> Result<(), SyncError> {
        let message = error.to_string();
        warn!(
            job_id = %job.id,
            entity_type = %entity_type,
            direction = %direction,
            error = %message,
            "sync phase failed"
        );
        self.checkpoints()
            .record_failure(&job.license_number, entity_type, direction, message.clone())
            .await?;
        failures.push(PhaseFailure {
            entity_type,
            direction,
            error: message,
        });
        Ok(())
    }

    async fn summary(
        &self,
        job: &SyncJob,
        phases: Vec<PhaseReport>,
        failures: Vec<PhaseFailure>,
        drain: Option<DrainSummary>,
    ) -> Result<RunSummary, SyncError> {
        let job = self.orchestrator.get_sync_job(&job.id).await?;
        if job.status.is_terminal() {
            self.orchestrator.forget(&job.id);
        }
        Ok(RunSummary {
            job,
            phases,
            failures,
            drain,
        })
    }
}
