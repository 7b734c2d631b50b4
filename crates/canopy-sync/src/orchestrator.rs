//! Sync job orchestrator: run lifecycle per license.
//!
//! "One active run per license" is enforced by the database, so concurrent
//! callers in any number of processes get the same job back. Cancellation is
//! persisted first, then signalled to in-process workers through a
//! [`CancellationToken`] per job.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use canopy_core::entities::{QueueItem, SyncJob};
use canopy_core::enums::{QueueItemStatus, SyncDirection};
use canopy_core::responses::{
    CancelSyncResponse, CheckpointSummary, RetryFailedResponse, StartSyncResponse,
    SyncStatusResponse,
};
use canopy_db::repos::sync_job::NewSyncJob;
use canopy_db::service::CanopyService;

use crate::checkpoint::CheckpointStore;
use crate::error::SyncError;
use crate::lifecycle::complete_if_drained;
use crate::queue::QueueManager;

pub const SKIP_JOB_CANCELLED: &str = "job_cancelled";
pub const SKIP_JOB_FAILED: &str = "job_failed";

/// Initiator recorded on runs started by [`SyncOrchestrator::start_due_syncs`].
pub const SCHEDULER_INITIATOR: &str = "scheduler";

#[derive(Debug, Clone)]
pub struct StartSyncRequest {
    pub license_number: String,
    pub direction: SyncDirection,
    pub force_full_sync: bool,
    pub initiated_by: Option<String>,
}

impl StartSyncRequest {
    pub fn new(license_number: impl Into<String>, direction: SyncDirection) -> Self {
        Self {
            license_number: license_number.into(),
            direction,
            force_full_sync: false,
            initiated_by: None,
        }
    }

    #[must_use]
    pub const fn force_full_sync(mut self, force: bool) -> Self {
        self.force_full_sync = force;
        self
    }

    #[must_use]
    pub fn initiated_by(mut self, initiator: impl Into<String>) -> Self {
        self.initiated_by = Some(initiator.into());
        self
    }
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    service: Arc<CanopyService>,
    queue: QueueManager,
    checkpoints: CheckpointStore,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
    /// Jobs this process is currently executing.
    running: Arc<Mutex<HashSet<String>>>,
}

/// Held for the duration of one in-process run; releases the job on drop.
pub(crate) struct RunGuard {
    running: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

impl SyncOrchestrator {
    pub fn new(service: Arc<CanopyService>, queue: QueueManager, checkpoints: CheckpointStore) -> Self {
        Self {
            service,
            queue,
            checkpoints,
            tokens: Arc::default(),
            running: Arc::default(),
        }
    }

    pub const fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub const fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Start a run for a license, or return the run already in progress.
    ///
    /// # Errors
    ///
    /// `Validation` if the license is unknown, inactive, or has no credentials.
    pub async fn start_sync(&self, request: StartSyncRequest) -> Result<StartSyncResponse, SyncError> {
        let number = request.license_number.as_str();
        let license = self
            .service
            .find_license_by_number(number)
            .await?
            .ok_or_else(|| SyncError::Validation(format!("unknown license {number}")))?;
        license.ensure_syncable()?;

        let new = NewSyncJob::running(&license, request.direction)
            .force_full_sync(request.force_full_sync)
            .initiated_by(request.initiated_by);
        let (job, created) = self.service.insert_sync_job_if_idle(&new).await?;
        if !created {
            info!(license = number, job_id = %job.id, "sync already in progress");
            return Ok(StartSyncResponse {
                message: format!("Sync already in progress for license {number}"),
                job,
                created,
            });
        }

        if job.force_full_sync {
            self.checkpoints.reset(number, None).await?;
        }
        self.cancellation_token(&job.id);
        info!(
            license = number,
            job_id = %job.id,
            direction = %job.direction,
            force_full_sync = job.force_full_sync,
            initiated_by = job.initiated_by.as_deref().unwrap_or(""),
            "sync job started"
        );
        Ok(StartSyncResponse {
            message: format!("Sync started for license {number}"),
            job,
            created,
        })
    }

    /// Cancel a run. `cancelled == false` if it had already finished.
    ///
    /// Pending items are skipped; items already delivered stay delivered.
    pub async fn cancel_sync_job(
        &self,
        job_id: &str,
        reason: Option<&str>,
    ) -> Result<CancelSyncResponse, SyncError> {
        self.get_sync_job(job_id).await?;
        let now = Utc::now();
        let Some(job) = self.service.cancel_sync_job(job_id, reason, now).await? else {
            debug!(job_id, "cancel requested for finished job");
            return Ok(CancelSyncResponse {
                job_id: job_id.to_string(),
                cancelled: false,
            });
        };

        let message = reason.unwrap_or("sync job cancelled");
        let skipped = self
            .queue
            .skip_pending_for_job(job_id, SKIP_JOB_CANCELLED, message)
            .await?;
        if let Some(token) = self.forget(job_id) {
            token.cancel();
        }
        self.service
            .record_license_sync_result(&job.license_number, Some(&format!("cancelled: {message}")), now)
            .await?;
        info!(job_id, license = %job.license_number, skipped, "sync job cancelled");
        Ok(CancelSyncResponse {
            job_id: job.id,
            cancelled: true,
        })
    }

    /// Fail a run outright. `None` if it had already finished.
    pub async fn fail_job(&self, job_id: &str, message: &str) -> Result<Option<SyncJob>, SyncError> {
        let now = Utc::now();
        let Some(job) = self.service.fail_sync_job(job_id, message, now).await? else {
            return Ok(None);
        };
        let skipped = self
            .queue
            .skip_pending_for_job(job_id, SKIP_JOB_FAILED, message)
            .await?;
        if let Some(token) = self.forget(job_id) {
            token.cancel();
        }
        self.service
            .record_license_sync_result(&job.license_number, Some(message), now)
            .await?;
        error!(job_id, license = %job.license_number, skipped, error = message, "sync job failed");
        Ok(Some(job))
    }

    /// Stop accepting work for the run and complete it if nothing is in
    /// flight. Returns the job when sealing completed it.
    pub async fn seal_job(&self, job_id: &str) -> Result<Option<SyncJob>, SyncError> {
        if !self.service.seal_sync_job(job_id).await? {
            return Ok(None);
        }
        debug!(job_id, "sync job sealed");
        let completed = complete_if_drained(&self.service, job_id).await?;
        if completed.is_some() {
            self.forget(job_id);
        }
        Ok(completed)
    }

    pub async fn get_sync_job(&self, job_id: &str) -> Result<SyncJob, SyncError> {
        self.service
            .get_sync_job(job_id)
            .await
            .map_err(SyncError::not_found_or("sync job", job_id))
    }

    /// Every pending or running job, oldest first.
    pub async fn get_active_sync_jobs(&self) -> Result<Vec<SyncJob>, SyncError> {
        Ok(self.service.list_active_sync_jobs().await?)
    }

    /// Jobs of a site, newest first.
    pub async fn get_sync_jobs(&self, site_id: &str, limit: u32) -> Result<Vec<SyncJob>, SyncError> {
        Ok(self.service.list_sync_jobs(site_id, limit).await?)
    }

    pub async fn get_sync_jobs_for_license(
        &self,
        license_number: &str,
        limit: u32,
    ) -> Result<Vec<SyncJob>, SyncError> {
        Ok(self
            .service
            .list_sync_jobs_for_license(license_number, limit)
            .await?)
    }

    /// Operator view of one license: active run, queue depth, checkpoints.
    pub async fn get_sync_status(&self, license_number: &str) -> Result<SyncStatusResponse, SyncError> {
        let license = self
            .service
            .find_license_by_number(license_number)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity: "license",
                id: license_number.to_string(),
            })?;
        let active_job = self.service.get_active_sync_job(license_number).await?;
        let checkpoints = self
            .checkpoints
            .list(license_number)
            .await?
            .iter()
            .map(CheckpointSummary::from)
            .collect();

        Ok(SyncStatusResponse {
            license_number: license.license_number,
            active_job,
            pending_count: self.queue.pending_count(license_number).await?,
            failed_count: self.queue.failed_count(license_number).await?,
            last_sync_at: license.last_sync_at,
            last_successful_sync_at: license.last_successful_sync_at,
            last_sync_error: license.last_sync_error,
            checkpoints,
        })
    }

    pub async fn retry_failed_items(&self, job_id: &str) -> Result<RetryFailedResponse, SyncError> {
        let reset_count = self.queue.retry_failed_items(job_id).await?;
        Ok(RetryFailedResponse {
            job_id: job_id.to_string(),
            reset_count,
        })
    }

    pub async fn get_queue_items(
        &self,
        job_id: &str,
        status: Option<QueueItemStatus>,
        limit: u32,
    ) -> Result<Vec<QueueItem>, SyncError> {
        self.queue.get_queue_items(job_id, status, limit).await
    }

    /// Start a bidirectional run for every auto-sync license due at `now`.
    ///
    /// Licenses that cannot be synced are logged and skipped.
    pub async fn start_due_syncs(&self, now: DateTime<Utc>) -> Result<Vec<StartSyncResponse>, SyncError> {
        let mut started = Vec::new();
        for license in self.service.list_auto_sync_licenses().await? {
            if !license.is_due_for_auto_sync(now) {
                continue;
            }
            let request = StartSyncRequest::new(&license.license_number, SyncDirection::Bidirectional)
                .initiated_by(SCHEDULER_INITIATOR);
            match self.start_sync(request).await {
                Ok(response) => started.push(response),
                Err(SyncError::Validation(reason)) => {
                    warn!(license = %license.license_number, %reason, "auto-sync skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(started)
    }

    /// Whether this process is executing the job right now.
    pub fn is_running_here(&self, job_id: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(job_id)
    }

    /// Register an in-process run. `None` if one is already underway here.
    pub(crate) fn begin_run(&self, job_id: &str) -> Option<RunGuard> {
        let inserted = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.to_string());
        inserted.then(|| RunGuard {
            running: Arc::clone(&self.running),
            job_id: job_id.to_string(),
        })
    }

    /// The in-process cancellation token for a job, created on first use.
    ///
    /// Only call this for a job known to be active: a token created after the
    /// job finished is never cancelled.
    pub fn cancellation_token(&self, job_id: &str) -> CancellationToken {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the token of a finished job.
    pub(crate) fn forget(&self, job_id: &str) -> Option<CancellationToken> {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id)
    }
}
