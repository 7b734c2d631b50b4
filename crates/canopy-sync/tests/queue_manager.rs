//! Queue manager integration tests: idempotent enqueue, supersession,
//! retry accounting, dependency gating, exclusive claims, job aggregation.

mod common;

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use canopy_core::entities::SyncJob;
use canopy_core::enums::{EntityType, OperationType, QueueItemStatus, SyncDirection, SyncJobStatus};
use canopy_sync::{ApiFailure, EnqueueRequest, StartSyncRequest, SyncError};

use common::{Harness, harness, harness_with, test_config};

async fn push_job(h: &Harness, license: &str) -> SyncJob {
    h.license(license).await;
    h.engine
        .orchestrator
        .start_sync(StartSyncRequest::new(license, SyncDirection::Push))
        .await
        .unwrap()
        .job
}

fn create(job: &SyncJob, local_id: &str) -> EnqueueRequest {
    EnqueueRequest::new(
        &job.id,
        EntityType::Package,
        OperationType::Create,
        local_id,
        json!({"Label": local_id}),
    )
}

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_change_same_day_returns_same_item() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    let day = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();

    let first = queue.enqueue_at(create(&job, "E123"), day).await.unwrap();
    let second = queue
        .enqueue_at(create(&job, "E123"), day + Duration::hours(5))
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.item.id, second.item.id);
    assert_eq!(first.item.idempotency_key, "CA-0001:package:E123:create:20260314");
    let items = queue.get_queue_items(&job.id, None, 100).await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn next_day_change_supersedes_pending_item() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    let day = Utc.with_ymd_and_hms(2026, 3, 14, 23, 0, 0).unwrap();

    let old = queue.enqueue_at(create(&job, "E123"), day).await.unwrap();
    let new = queue
        .enqueue_at(create(&job, "E123"), day + Duration::hours(2))
        .await
        .unwrap();

    assert!(new.created);
    assert_ne!(old.item.id, new.item.id);
    assert_eq!(new.superseded, vec![old.item.id.clone()]);
    let skipped = queue
        .get_queue_items(&job.id, Some(QueueItemStatus::Skipped), 10)
        .await
        .unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].id, old.item.id);
    assert_eq!(
        skipped[0].last_error.as_ref().unwrap().code.as_deref(),
        Some("superseded")
    );
}

#[tokio::test]
async fn enqueue_into_unknown_or_finished_job_is_rejected() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();

    let mut unknown = create(&job, "E1");
    unknown.sync_job_id = "job-000000000000".into();
    assert!(matches!(
        queue.enqueue(unknown).await,
        Err(SyncError::NotFound { entity: "sync job", .. })
    ));

    h.engine
        .orchestrator
        .cancel_sync_job(&job.id, None)
        .await
        .unwrap();
    assert!(matches!(
        queue.enqueue(create(&job, "E1")).await,
        Err(SyncError::Validation(_))
    ));
}

#[tokio::test]
async fn enqueue_into_sealed_job_is_rejected() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    queue.enqueue(create(&job, "E1")).await.unwrap();

    let completed = h.engine.orchestrator.seal_job(&job.id).await.unwrap();
    assert!(completed.is_none(), "job with pending work must not complete");
    assert!(matches!(
        queue.enqueue(create(&job, "E2")).await,
        Err(SyncError::Validation(_))
    ));
}

#[tokio::test]
async fn unknown_dependency_is_rejected() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let request = create(&job, "E1").depends_on(Some("qit-000000000000".into()));
    assert!(matches!(
        h.engine.orchestrator.queue().enqueue(request).await,
        Err(SyncError::Validation(_))
    ));
}

// ---------------------------------------------------------------------------
// Failure accounting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn max_retries_minus_one_failures_stay_pending() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    let item = queue
        .enqueue(create(&job, "E1").max_retries(3))
        .await
        .unwrap()
        .item;
    let failure = ApiFailure::transient("Service unavailable").with_code("503");

    for expected in 1..3 {
        let updated = queue.fail(&item.id, &failure).await.unwrap();
        assert_eq!(updated.status, QueueItemStatus::Pending);
        assert_eq!(updated.retry_count, expected);
    }
    let last = queue.fail(&item.id, &failure).await.unwrap();
    assert_eq!(last.status, QueueItemStatus::Failed);
    assert_eq!(last.retry_count, 3);
    assert_eq!(last.last_error.unwrap().code.as_deref(), Some("503"));

    assert!(matches!(
        queue.fail(&item.id, &failure).await,
        Err(SyncError::InvalidState(_))
    ));
    assert_eq!(queue.failed_count("CA-0001").await.unwrap(), 1);
    assert_eq!(queue.pending_count("CA-0001").await.unwrap(), 0);
}

#[tokio::test]
async fn permanent_failure_is_terminal_when_configured() {
    let mut config = test_config();
    config.retry.retry_permanent_errors = false;
    let h = harness_with(config).await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    let item = queue.enqueue(create(&job, "E1")).await.unwrap().item;

    let updated = queue
        .fail(&item.id, &ApiFailure::permanent("Invalid tag").with_code("400"))
        .await
        .unwrap();
    assert_eq!(updated.status, QueueItemStatus::Failed);
    assert_eq!(updated.retry_count, 1);
}

#[tokio::test]
async fn rate_limited_failure_is_distinguishable() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    let item = queue.enqueue(create(&job, "E1")).await.unwrap().item;

    let updated = queue
        .fail(&item.id, &ApiFailure::rate_limited("Too many requests"))
        .await
        .unwrap();
    assert_eq!(updated.status, QueueItemStatus::Pending);
    assert_eq!(
        updated.last_error.unwrap().code.as_deref(),
        Some("rate_limited")
    );
}

#[tokio::test]
async fn backoff_gates_retried_item() {
    let mut config = test_config();
    config.retry.base_delay_ms = 60_000;
    config.retry.max_delay_ms = 60_000;
    let h = harness_with(config).await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    let item = queue.enqueue(create(&job, "E1")).await.unwrap().item;

    queue
        .fail(&item.id, &ApiFailure::transient("timeout"))
        .await
        .unwrap();
    let batch = queue.get_next_batch("CA-0001", 10, "w1").await.unwrap();
    assert!(batch.is_empty());
    assert_eq!(queue.pending_count("CA-0001").await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Claims and dependencies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dependent_is_never_claimed_before_predecessor_completes() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    let create_item = queue.enqueue(create(&job, "P1")).await.unwrap().item;
    let move_item = queue
        .enqueue(
            EnqueueRequest::new(
                &job.id,
                EntityType::Package,
                OperationType::Move,
                "P1",
                json!({"Location": "Vault"}),
            )
            .priority(1)
            .depends_on(Some(create_item.id.clone())),
        )
        .await
        .unwrap()
        .item;

    let first = queue.get_next_batch("CA-0001", 10, "w1").await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].id, create_item.id);
    assert!(queue.get_next_batch("CA-0001", 10, "w1").await.unwrap().is_empty());

    queue
        .complete(&create_item.id, Some("998877"), Some("1A4FF01"), None)
        .await
        .unwrap();
    let second = queue.get_next_batch("CA-0001", 10, "w1").await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, move_item.id);
}

#[tokio::test]
async fn failed_predecessor_skips_dependents_and_retry_restores_them() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    let root = queue
        .enqueue(create(&job, "P1").max_retries(1))
        .await
        .unwrap()
        .item;
    let child = queue
        .enqueue(
            EnqueueRequest::new(&job.id, EntityType::Package, OperationType::Move, "P1", json!({}))
                .depends_on(Some(root.id.clone())),
        )
        .await
        .unwrap()
        .item;
    let grandchild = queue
        .enqueue(
            EnqueueRequest::new(&job.id, EntityType::Package, OperationType::Finish, "P1", json!({}))
                .depends_on(Some(child.id.clone())),
        )
        .await
        .unwrap()
        .item;

    queue
        .fail(&root.id, &ApiFailure::transient("503"))
        .await
        .unwrap();
    let skipped = queue
        .get_queue_items(&job.id, Some(QueueItemStatus::Skipped), 10)
        .await
        .unwrap();
    let mut skipped_ids: Vec<_> = skipped.iter().map(|i| i.id.clone()).collect();
    skipped_ids.sort();
    let mut expected = vec![child.id.clone(), grandchild.id.clone()];
    expected.sort();
    assert_eq!(skipped_ids, expected);

    let reset = h
        .engine
        .orchestrator
        .retry_failed_items(&job.id)
        .await
        .unwrap();
    assert_eq!(reset.reset_count, 3);
    assert_eq!(queue.pending_count("CA-0001").await.unwrap(), 3);
    let job = h.engine.orchestrator.get_sync_job(&job.id).await.unwrap();
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.counts.processed, 0);
    assert_eq!(job.counts.failed, 0);
}

#[tokio::test]
async fn concurrent_claims_never_share_items() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue().clone();
    for i in 0..20 {
        queue.enqueue(create(&job, &format!("E{i}"))).await.unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                let batch = queue
                    .get_next_batch("CA-0001", 3, &format!("w{w}"))
                    .await
                    .unwrap();
                if batch.is_empty() {
                    break;
                }
                claimed.extend(batch.into_iter().map(|i| i.id));
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(total, 20);
    assert_eq!(all.len(), 20);
}

#[tokio::test]
async fn completing_terminal_item_is_invalid() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    let item = queue.enqueue(create(&job, "E1")).await.unwrap().item;
    queue.complete(&item.id, None, None, None).await.unwrap();
    assert!(matches!(
        queue.complete(&item.id, None, None, None).await,
        Err(SyncError::InvalidState(_))
    ));
    assert!(matches!(
        queue.complete("qit-000000000000", None, None, None).await,
        Err(SyncError::NotFound { .. })
    ));
}

// ---------------------------------------------------------------------------
// Job aggregation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sealed_job_completes_when_last_item_finishes() {
    let h = harness().await;
    let job = push_job(&h, "CA-0001").await;
    let queue = h.engine.orchestrator.queue();
    let ok = queue.enqueue(create(&job, "E1")).await.unwrap().item;
    let bad = queue
        .enqueue(create(&job, "E2").max_retries(1))
        .await
        .unwrap()
        .item;
    h.engine.orchestrator.seal_job(&job.id).await.unwrap();

    queue.complete(&ok.id, Some("1"), None, None).await.unwrap();
    let running = h.engine.orchestrator.get_sync_job(&job.id).await.unwrap();
    assert_eq!(running.status, SyncJobStatus::Running);

    queue
        .fail(&bad.id, &ApiFailure::permanent("Invalid tag"))
        .await
        .unwrap();
    let done = h.engine.orchestrator.get_sync_job(&job.id).await.unwrap();
    assert_eq!(done.status, SyncJobStatus::Completed);
    assert_eq!(done.counts.total, 2);
    assert_eq!(done.counts.processed, 2);
    assert_eq!(done.counts.successful, 1);
    assert_eq!(done.counts.failed, 1);

    let status = h.engine.orchestrator.get_sync_status("CA-0001").await.unwrap();
    assert!(status.active_job.is_none());
    assert!(status.last_successful_sync_at.is_some());
    assert_eq!(status.failed_count, 1);
}
