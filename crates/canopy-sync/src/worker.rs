//! Queue worker: the claim-and-process loop for one license.
//!
//! Claims ready batches, delivers up to `concurrency` items at a time through
//! the entity mapper and the regulator adapter, and settles each item through
//! the queue manager. Every regulator call is bounded by the request timeout
//! and raced against the job's cancellation token.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use canopy_config::SyncConfig;
use canopy_core::entities::{QueueItem, SyncJob};
use canopy_core::enums::{QueueItemStatus, SyncJobStatus};
use canopy_db::service::CanopyService;

use crate::collaborators::{AdapterRegistry, EntityMapper};
use crate::error::{ApiFailure, SyncError};
use crate::orchestrator::SKIP_JOB_CANCELLED;
use crate::queue::QueueManager;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Recorded as `claimed_by` on claimed items.
    pub worker_id: String,
    pub batch_size: u32,
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub claim_timeout: Duration,
    pub request_timeout: Duration,
}

impl WorkerConfig {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            worker_id: format!("canopy-{}", std::process::id()),
            batch_size: config.batch_size.max(1),
            concurrency: usize::try_from(config.worker_concurrency.max(1)).unwrap_or(1),
            poll_interval: config.poll_interval(),
            claim_timeout: config.claim_timeout(),
            request_timeout: config.request_timeout(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// How one item attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed,
    /// Failed, back to `Pending` behind a backoff gate.
    Retrying,
    Failed,
    Skipped,
}

impl From<QueueItemStatus> for ItemOutcome {
    fn from(status: QueueItemStatus) -> Self {
        match status {
            QueueItemStatus::Pending | QueueItemStatus::Processing => Self::Retrying,
            QueueItemStatus::Completed => Self::Completed,
            QueueItemStatus::Failed => Self::Failed,
            QueueItemStatus::Skipped => Self::Skipped,
        }
    }
}

/// Totals of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub batches: u32,
    pub completed: u32,
    pub retrying: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Attempts that ended in an engine error rather than an item outcome.
    pub errors: u32,
    pub cancelled: bool,
}

impl DrainSummary {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Completed => self.completed += 1,
            ItemOutcome::Retrying => self.retrying += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Clone)]
pub struct QueueWorker {
    service: Arc<CanopyService>,
    queue: QueueManager,
    adapters: Arc<AdapterRegistry>,
    mapper: Arc<dyn EntityMapper>,
    config: WorkerConfig,
}

impl QueueWorker {
    pub fn new(
        service: Arc<CanopyService>,
        queue: QueueManager,
        adapters: Arc<AdapterRegistry>,
        mapper: Arc<dyn EntityMapper>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            service,
            queue,
            adapters,
            mapper,
            config,
        }
    }

    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Deliver the job's license queue until the job has nothing in flight,
    /// the job stops running, or `token` is cancelled.
    ///
    /// Items gated by backoff or by a predecessor are waited for, polling
    /// every `poll_interval`. While idle, abandoned claims are released and
    /// items behind a predecessor that will never complete are skipped.
    pub async fn drain(
        &self,
        job: &SyncJob,
        token: &CancellationToken,
    ) -> Result<DrainSummary, SyncError> {
        let mut summary = DrainSummary::default();
        info!(
            job_id = %job.id,
            license = %job.license_number,
            worker_id = %self.config.worker_id,
            "queue drain started"
        );

        loop {
            if token.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let batch = self
                .queue
                .get_next_batch(&job.license_number, self.config.batch_size, &self.config.worker_id)
                .await?;
            if !batch.is_empty() {
                summary.batches += 1;
                self.process_batch(batch, token, &mut summary).await;
                continue;
            }

            let current = self.service.get_sync_job(&job.id).await?;
            if matches!(current.status, SyncJobStatus::Cancelled | SyncJobStatus::Failed) {
                summary.cancelled = current.status == SyncJobStatus::Cancelled;
                break;
            }
            let stranded = self.queue.skip_stranded(&job.id).await?;
            summary.skipped += u32::try_from(stranded).unwrap_or(u32::MAX);
            if self.queue.in_flight_count(&job.id).await? == 0 {
                break;
            }

            self.queue
                .release_stale_claims(self.config.claim_timeout)
                .await?;
            tokio::select! {
                () = token.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(
            job_id = %job.id,
            batches = summary.batches,
            completed = summary.completed,
            retrying = summary.retrying,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "queue drain finished"
        );
        Ok(summary)
    }

    async fn process_batch(
        &self,
        batch: Vec<QueueItem>,
        token: &CancellationToken,
        summary: &mut DrainSummary,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();

        for item in batch {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let worker = self.clone();
            let token = token.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let item_id = item.id.clone();
                (item_id, worker.process_item(item, &token).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => summary.record(outcome),
                Ok((item_id, Err(e))) => {
                    summary.errors += 1;
                    error!(item_id = %item_id, error = %e, "item processing error");
                }
                Err(e) => {
                    summary.errors += 1;
                    error!(error = %e, "item task panicked");
                }
            }
        }
    }

    /// Deliver one claimed item and settle it.
    pub async fn process_item(
        &self,
        item: QueueItem,
        token: &CancellationToken,
    ) -> Result<ItemOutcome, SyncError> {
        debug!(
            item_id = %item.id,
            entity_type = %item.entity_type,
            operation = %item.operation_type,
            attempt = item.retry_count + 1,
            "delivering item"
        );

        let Some(adapter) = self.adapters.get(item.entity_type) else {
            let failure = ApiFailure::permanent(format!(
                "no regulator adapter for {}",
                item.entity_type
            ))
            .with_code("no_adapter");
            return self.settle_failure(&item, &failure).await;
        };

        let payload = match self.mapper.to_regulator_payload(&item).await {
            Ok(payload) => payload,
            Err(e) => {
                let failure = ApiFailure::permanent(format!("{e:#}")).with_code("mapping_error");
                return self.settle_failure(&item, &failure).await;
            }
        };

        let call = tokio::time::timeout(
            self.config.request_timeout,
            adapter.execute(&item.license_number, item.operation_type, &payload),
        );
        let result = tokio::select! {
            () = token.cancelled() => {
                let skipped = self
                    .queue
                    .skip(&item.id, SKIP_JOB_CANCELLED, "sync job cancelled")
                    .await?;
                debug!(item_id = %item.id, settled = skipped.is_some(), "delivery interrupted");
                return Ok(ItemOutcome::Skipped);
            }
            result = call => result,
        };

        let response = match result {
            Err(_) => {
                let failure = ApiFailure::transient(format!(
                    "regulator call exceeded {}s",
                    self.config.request_timeout.as_secs()
                ))
                .with_code("timeout");
                return self.settle_failure(&item, &failure).await;
            }
            Ok(Err(failure)) => return self.settle_failure(&item, &failure).await,
            Ok(Ok(response)) => response,
        };

        if let Some(failure) = response.failure() {
            return self.settle_failure(&item, &failure).await;
        }
        match self
            .queue
            .complete(
                &item.id,
                response.remote_id.as_deref(),
                response.remote_label.as_deref(),
                response.raw.as_deref(),
            )
            .await
        {
            Ok(_) => Ok(ItemOutcome::Completed),
            Err(SyncError::InvalidState(reason)) => {
                warn!(item_id = %item.id, %reason, "delivered item was settled elsewhere");
                Ok(ItemOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }

    async fn settle_failure(
        &self,
        item: &QueueItem,
        failure: &ApiFailure,
    ) -> Result<ItemOutcome, SyncError> {
        match self.queue.fail(&item.id, failure).await {
            Ok(updated) => Ok(updated.status.into()),
            Err(SyncError::InvalidState(reason)) => {
                warn!(item_id = %item.id, %reason, "failed item was settled elsewhere");
                Ok(ItemOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }
}
