//! Queue manager: the durable outbox of regulator mutations.
//!
//! Wraps the queue item repository with idempotent enqueue, supersession of
//! stale changes, classified failure recording with backoff, dependency
//! cascades, and operator retries. Every transition that can finish an item
//! also checks whether the owning job has drained.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use canopy_core::entities::{QueueItem, idempotency_key, next_after_failure};
use canopy_core::enums::{EntityType, OperationType, QueueItemStatus, SyncJobStatus};
use canopy_db::repos::queue_item::NewQueueItem;
use canopy_db::service::CanopyService;

use crate::backoff::RetryPolicy;
use crate::error::{ApiFailure, SyncError};
use crate::lifecycle::complete_if_drained;

/// Priority given to changes that do not ask for one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Attempts at recording a failure before giving up on a contended item.
const FAIL_ATTEMPTS: usize = 5;

/// One change to deliver.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub sync_job_id: String,
    pub entity_type: EntityType,
    pub operation_type: OperationType,
    pub local_entity_id: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub remote_id: Option<String>,
    pub remote_label: Option<String>,
    pub depends_on_item_id: Option<String>,
    /// Overrides the policy's retry budget.
    pub max_retries: Option<u32>,
}

impl EnqueueRequest {
    pub fn new(
        sync_job_id: impl Into<String>,
        entity_type: EntityType,
        operation_type: OperationType,
        local_entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            sync_job_id: sync_job_id.into(),
            entity_type,
            operation_type,
            local_entity_id: local_entity_id.into(),
            payload,
            priority: DEFAULT_PRIORITY,
            remote_id: None,
            remote_label: None,
            depends_on_item_id: None,
            max_retries: None,
        }
    }

    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn remote(mut self, remote_id: Option<String>, remote_label: Option<String>) -> Self {
        self.remote_id = remote_id;
        self.remote_label = remote_label;
        self
    }

    #[must_use]
    pub fn depends_on(mut self, item_id: Option<String>) -> Self {
        self.depends_on_item_id = item_id;
        self
    }

    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Result of an enqueue.
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub item: QueueItem,
    /// `false` when an in-flight item with the same key was returned.
    pub created: bool,
    /// Ids of older pending items this change replaced.
    pub superseded: Vec<String>,
}

#[derive(Clone)]
pub struct QueueManager {
    service: Arc<CanopyService>,
    policy: RetryPolicy,
}

impl QueueManager {
    pub const fn new(service: Arc<CanopyService>, policy: RetryPolicy) -> Self {
        Self { service, policy }
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Enqueue a change, deduplicated by its day-scoped idempotency key.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown job; `Validation` if the job is terminal or
    /// sealed, or the dependency does not exist.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<EnqueueOutcome, SyncError> {
        self.enqueue_at(request, Utc::now()).await
    }

    /// [`Self::enqueue`] with an explicit clock, which fixes the key's day.
    pub async fn enqueue_at(
        &self,
        request: EnqueueRequest,
        now: DateTime<Utc>,
    ) -> Result<EnqueueOutcome, SyncError> {
        let job = self
            .service
            .get_sync_job(&request.sync_job_id)
            .await
            .map_err(SyncError::not_found_or("sync job", &request.sync_job_id))?;
        if job.status.is_terminal() {
            return Err(SyncError::Validation(format!(
                "sync job {} is {}",
                job.id, job.status
            )));
        }
        if job.sealed {
            return Err(SyncError::Validation(format!(
                "sync job {} no longer accepts work",
                job.id
            )));
        }

        let dependency = match &request.depends_on_item_id {
            Some(dep_id) => {
                let dep = self.service.get_queue_item(dep_id).await.map_err(|_| {
                    SyncError::Validation(format!("dependency {dep_id} does not exist"))
                })?;
                if dep.license_number != job.license_number {
                    return Err(SyncError::Validation(format!(
                        "dependency {dep_id} belongs to license {}",
                        dep.license_number
                    )));
                }
                Some(dep)
            }
            None => None,
        };

        let key = idempotency_key(
            &job.license_number,
            request.entity_type,
            &request.local_entity_id,
            request.operation_type,
            now.date_naive(),
        );
        let new = NewQueueItem {
            sync_job_id: job.id.clone(),
            site_id: job.site_id.clone(),
            license_number: job.license_number.clone(),
            entity_type: request.entity_type,
            operation_type: request.operation_type,
            local_entity_id: request.local_entity_id,
            remote_id: request.remote_id,
            remote_label: request.remote_label,
            payload: request.payload,
            priority: request.priority,
            max_retries: request.max_retries.unwrap_or(self.policy.max_retries),
            idempotency_key: key,
            depends_on_item_id: request.depends_on_item_id,
        };

        let (item, created) = self.service.insert_queue_item(&new, now).await?;
        if !created {
            debug!(
                item_id = %item.id,
                key = %item.idempotency_key,
                "change already in flight"
            );
            return Ok(EnqueueOutcome {
                item,
                created,
                superseded: Vec::new(),
            });
        }

        let superseded: Vec<String> = self
            .service
            .supersede_pending_queue_items(
                &item.license_number,
                item.entity_type,
                &item.local_entity_id,
                item.operation_type,
                &item.idempotency_key,
                now,
            )
            .await?
            .into_iter()
            .map(|old| old.id)
            .collect();
        if !superseded.is_empty() {
            self.service.repoint_dependents(&superseded, &item.id).await?;
            info!(
                item_id = %item.id,
                superseded = ?superseded,
                "older pending changes superseded"
            );
        }

        // Read the predecessor again now that the item is visible: a failure
        // cascade that ran between the first read and the insert missed it.
        if let Some(dep) = dependency {
            let dep = self
                .service
                .get_queue_item(&dep.id)
                .await
                .map_err(SyncError::not_found_or("queue item", &dep.id))?;
            if matches!(dep.status, QueueItemStatus::Failed | QueueItemStatus::Skipped) {
                self.skip_dependents(&dep.id, now).await?;
            }
        }

        debug!(
            item_id = %item.id,
            job_id = %item.sync_job_id,
            entity_type = %item.entity_type,
            operation = %item.operation_type,
            "item enqueued"
        );
        Ok(EnqueueOutcome {
            item,
            created,
            superseded,
        })
    }

    /// Claim up to `batch_size` ready items for the license, in delivery order.
    pub async fn get_next_batch(
        &self,
        license_number: &str,
        batch_size: u32,
        worker_id: &str,
    ) -> Result<Vec<QueueItem>, SyncError> {
        let items = self
            .service
            .claim_ready_queue_items(license_number, batch_size, worker_id, Utc::now())
            .await?;
        if !items.is_empty() {
            debug!(license = license_number, worker_id, count = items.len(), "items claimed");
        }
        Ok(items)
    }

    /// Mark an item delivered.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown item, `InvalidState` if it is already terminal.
    pub async fn complete(
        &self,
        item_id: &str,
        remote_id: Option<&str>,
        remote_label: Option<&str>,
        response_snapshot: Option<&str>,
    ) -> Result<QueueItem, SyncError> {
        let Some(item) = self
            .service
            .complete_queue_item(item_id, remote_id, remote_label, response_snapshot, Utc::now())
            .await?
        else {
            return Err(self.not_in_flight(item_id).await);
        };
        info!(
            item_id = %item.id,
            entity_type = %item.entity_type,
            operation = %item.operation_type,
            remote_id = item.remote_id.as_deref().unwrap_or(""),
            "item completed"
        );
        complete_if_drained(&self.service, &item.sync_job_id).await?;
        Ok(item)
    }

    /// Record a failed delivery attempt.
    ///
    /// Retryable failures return the item to `Pending` behind a backoff gate
    /// until its retry budget is spent. An item that ends `Failed` takes its
    /// pending dependents down with it.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown item, `InvalidState` if it is already terminal.
    pub async fn fail(&self, item_id: &str, failure: &ApiFailure) -> Result<QueueItem, SyncError> {
        let error = failure.to_item_error();
        for _ in 0..FAIL_ATTEMPTS {
            let now = Utc::now();
            let item = self
                .service
                .get_queue_item(item_id)
                .await
                .map_err(SyncError::not_found_or("queue item", item_id))?;
            item.ensure_transition(QueueItemStatus::Failed)?;

            let transition = next_after_failure(
                item.retry_count,
                item.max_retries,
                self.policy.is_retryable(failure.kind),
            );
            let delay = self.policy.delay_for(failure.kind, transition.retry_count);
            let next_attempt_at = if transition.will_retry() {
                Some(now + to_chrono(delay)?)
            } else {
                None
            };

            let Some(updated) = self
                .service
                .record_queue_item_failure(
                    item_id,
                    item.retry_count,
                    transition,
                    &error,
                    next_attempt_at,
                    now,
                )
                .await?
            else {
                continue;
            };

            if transition.will_retry() {
                info!(
                    item_id = %updated.id,
                    kind = %failure.kind,
                    retry_count = updated.retry_count,
                    max_retries = updated.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "item failed, will retry"
                );
            } else {
                warn!(
                    item_id = %updated.id,
                    kind = %failure.kind,
                    retry_count = updated.retry_count,
                    error = %failure.message,
                    "item failed permanently"
                );
                self.skip_dependents(&updated.id, now).await?;
                complete_if_drained(&self.service, &updated.sync_job_id).await?;
            }
            return Ok(updated);
        }
        Err(SyncError::InvalidState(format!(
            "queue item {item_id} kept changing while recording a failure"
        )))
    }

    /// Skip one in-flight item, cascading to its dependents.
    /// `None` if it had already finished.
    pub async fn skip(
        &self,
        item_id: &str,
        code: &str,
        message: &str,
    ) -> Result<Option<QueueItem>, SyncError> {
        let now = Utc::now();
        let Some(item) = self
            .service
            .skip_queue_item(item_id, code, message, now)
            .await?
        else {
            return Ok(None);
        };
        debug!(item_id = %item.id, code, "item skipped");
        self.skip_dependents(&item.id, now).await?;
        complete_if_drained(&self.service, &item.sync_job_id).await?;
        Ok(Some(item))
    }

    /// Skip every pending item of a job and cascade to their dependents,
    /// including dependents queued under other jobs. Returns the number of
    /// items skipped.
    pub async fn skip_pending_for_job(
        &self,
        sync_job_id: &str,
        code: &str,
        message: &str,
    ) -> Result<usize, SyncError> {
        let now = Utc::now();
        let skipped = self
            .service
            .skip_pending_items_for_job(sync_job_id, code, message, now)
            .await?;
        let mut count = skipped.len();
        for item in &skipped {
            count += self.skip_dependents(&item.id, now).await?;
        }
        Ok(count)
    }

    /// Skip the job's pending items that wait on a predecessor which will
    /// never complete, cascading further. Returns the number skipped.
    pub async fn skip_stranded(&self, sync_job_id: &str) -> Result<usize, SyncError> {
        let now = Utc::now();
        let stranded = self
            .service
            .skip_stranded_queue_items(sync_job_id, now)
            .await?;
        if stranded.is_empty() {
            return Ok(0);
        }
        let mut count = stranded.len();
        for item in &stranded {
            warn!(
                item_id = %item.id,
                predecessor = item.depends_on_item_id.as_deref().unwrap_or(""),
                "stranded item skipped"
            );
            count += self.skip_dependents(&item.id, now).await?;
        }
        complete_if_drained(&self.service, sync_job_id).await?;
        Ok(count)
    }

    /// Skip every pending item transitively depending on `root_id`. Jobs
    /// other than the root's that lose their last in-flight item complete.
    async fn skip_dependents(&self, root_id: &str, now: DateTime<Utc>) -> Result<usize, SyncError> {
        let mut frontier = VecDeque::from([root_id.to_string()]);
        let mut jobs = BTreeSet::new();
        let mut skipped = 0;
        while let Some(id) = frontier.pop_front() {
            for dependent in self.service.skip_pending_dependents(&id, now).await? {
                debug!(item_id = %dependent.id, predecessor = %id, "dependent skipped");
                skipped += 1;
                jobs.insert(dependent.sync_job_id);
                frontier.push_back(dependent.id);
            }
        }
        for job_id in &jobs {
            complete_if_drained(&self.service, job_id).await?;
        }
        Ok(skipped)
    }

    /// Return a job's failed items (and their skipped dependents) to `Pending`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown job; `Validation` for a cancelled or failed job.
    pub async fn retry_failed_items(&self, sync_job_id: &str) -> Result<u32, SyncError> {
        let job = self
            .service
            .get_sync_job(sync_job_id)
            .await
            .map_err(SyncError::not_found_or("sync job", sync_job_id))?;
        if matches!(job.status, SyncJobStatus::Cancelled | SyncJobStatus::Failed) {
            return Err(SyncError::Validation(format!(
                "cannot retry items of a {} sync job",
                job.status
            )));
        }

        let reset = self
            .service
            .reset_failed_queue_items(sync_job_id, Utc::now())
            .await?;
        self.service.increment_sync_job_retry(sync_job_id).await?;
        let reset = u32::try_from(reset).unwrap_or(u32::MAX);
        info!(job_id = sync_job_id, reset, "failed items reset for retry");
        Ok(reset)
    }

    /// Return items whose claim is older than `older_than` to `Pending`.
    pub async fn release_stale_claims(
        &self,
        older_than: Duration,
    ) -> Result<Vec<QueueItem>, SyncError> {
        let now = Utc::now();
        let released = self
            .service
            .release_stale_queue_claims(now - to_chrono(older_than)?, now)
            .await?;
        for item in &released {
            warn!(
                item_id = %item.id,
                license = %item.license_number,
                "stale claim released"
            );
        }
        Ok(released)
    }

    pub async fn pending_count(&self, license_number: &str) -> Result<u32, SyncError> {
        Ok(self
            .service
            .count_queue_items(license_number, QueueItemStatus::Pending)
            .await?)
    }

    pub async fn failed_count(&self, license_number: &str) -> Result<u32, SyncError> {
        Ok(self
            .service
            .count_queue_items(license_number, QueueItemStatus::Failed)
            .await?)
    }

    /// Items of a job in delivery order, optionally filtered by status.
    pub async fn get_queue_items(
        &self,
        sync_job_id: &str,
        status: Option<QueueItemStatus>,
        limit: u32,
    ) -> Result<Vec<QueueItem>, SyncError> {
        self.service
            .get_sync_job(sync_job_id)
            .await
            .map_err(SyncError::not_found_or("sync job", sync_job_id))?;
        Ok(self
            .service
            .list_queue_items(sync_job_id, status, limit)
            .await?)
    }

    /// The in-flight item for a change enqueued on `now`'s day, if any.
    pub async fn find_in_flight(
        &self,
        license_number: &str,
        entity_type: EntityType,
        local_entity_id: &str,
        operation_type: OperationType,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueItem>, SyncError> {
        let key = idempotency_key(
            license_number,
            entity_type,
            local_entity_id,
            operation_type,
            now.date_naive(),
        );
        Ok(self.service.find_inflight_queue_item(&key).await?)
    }

    pub async fn in_flight_count(&self, sync_job_id: &str) -> Result<u32, SyncError> {
        Ok(self
            .service
            .count_inflight_items_for_job(sync_job_id)
            .await?)
    }

    async fn not_in_flight(&self, item_id: &str) -> SyncError {
        match self.service.get_queue_item(item_id).await {
            Ok(item) => match item.ensure_transition(QueueItemStatus::Completed) {
                Err(e) => e.into(),
                Ok(()) => {
                    SyncError::InvalidState(format!("queue item {item_id} changed while settling"))
                }
            },
            Err(e) => SyncError::not_found_or("queue item", item_id)(e),
        }
    }
}

fn to_chrono(delay: Duration) -> Result<chrono::Duration, SyncError> {
    chrono::Duration::from_std(delay)
        .map_err(|e| SyncError::InvalidState(format!("delay out of range: {e}")))
}
