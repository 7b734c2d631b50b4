//! Outbox queue item repository.
//!
//! Every state change is a single conditional statement. Claims move items
//! from `pending` to `processing` in one `UPDATE ... RETURNING`, so two workers
//! (in one process or many) never receive the same item.

use chrono::{DateTime, Utc};

use canopy_core::entities::{FailureTransition, ItemError, QueueItem};
use canopy_core::enums::{EntityType, OperationType, QueueItemStatus};
use canopy_core::ids::PREFIX_QUEUE_ITEM;

use crate::error::DatabaseError;
use crate::helpers::{
    fmt_datetime, fmt_optional_datetime, get_opt_datetime, get_opt_string, get_u32, parse_datetime,
    parse_enum, parse_json, placeholders,
};
use crate::service::CanopyService;

const SELECT_COLS: &str = "id, sync_job_id, site_id, license_number, entity_type, operation_type, \
     local_entity_id, remote_id, remote_label, payload, priority, status, retry_count, max_retries, \
     idempotency_key, depends_on_item_id, last_error_message, last_error_code, last_error_response, \
     response_snapshot, next_attempt_at, claimed_by, claimed_at, created_at, updated_at, completed_at";

/// Attempts at insert-or-fetch; see `insert_sync_job_if_idle` for the race.
const INSERT_ATTEMPTS: usize = 3;

pub const SKIP_SUPERSEDED: &str = "superseded";
pub const SKIP_DEPENDENCY_FAILED: &str = "dependency_failed";

fn row_to_item(row: &libsql::Row) -> Result<QueueItem, DatabaseError> {
    let last_error = get_opt_string(row, 16)?
        .map(|message| -> Result<ItemError, DatabaseError> {
            Ok(ItemError {
                message,
                code: get_opt_string(row, 17)?,
                response: get_opt_string(row, 18)?,
            })
        })
        .transpose()?;
    let priority = row.get::<i64>(10)?;

    Ok(QueueItem {
        id: row.get(0)?,
        sync_job_id: row.get(1)?,
        site_id: row.get(2)?,
        license_number: row.get(3)?,
        entity_type: parse_enum(&row.get::<String>(4)?)?,
        operation_type: parse_enum(&row.get::<String>(5)?)?,
        local_entity_id: row.get(6)?,
        remote_id: get_opt_string(row, 7)?,
        remote_label: get_opt_string(row, 8)?,
        payload: parse_json(&row.get::<String>(9)?)?,
        priority: i32::try_from(priority)
            .map_err(|_| DatabaseError::Corrupt(format!("priority out of range: {priority}")))?,
        status: parse_enum(&row.get::<String>(11)?)?,
        retry_count: get_u32(row, 12)?,
        max_retries: get_u32(row, 13)?,
        idempotency_key: row.get(14)?,
        depends_on_item_id: get_opt_string(row, 15)?,
        last_error,
        response_snapshot: get_opt_string(row, 19)?,
        next_attempt_at: get_opt_datetime(row, 20)?,
        claimed_by: get_opt_string(row, 21)?,
        claimed_at: get_opt_datetime(row, 22)?,
        created_at: parse_datetime(&row.get::<String>(23)?)?,
        updated_at: parse_datetime(&row.get::<String>(24)?)?,
        completed_at: get_opt_datetime(row, 25)?,
    })
}

/// Fields for a new outbox item. Site and license come from the owning job.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub sync_job_id: String,
    pub site_id: String,
    pub license_number: String,
    pub entity_type: EntityType,
    pub operation_type: OperationType,
    pub local_entity_id: String,
    pub remote_id: Option<String>,
    pub remote_label: Option<String>,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub max_retries: u32,
    pub idempotency_key: String,
    pub depends_on_item_id: Option<String>,
}

impl CanopyService {
    /// Insert an item unless one with the same idempotency key is in flight.
    ///
    /// Returns `(item, true)` for a new row, or `(in_flight, false)`.
    pub async fn insert_queue_item(
        &self,
        new: &NewQueueItem,
        now: DateTime<Utc>,
    ) -> Result<(QueueItem, bool), DatabaseError> {
        let payload = serde_json::to_string(&new.payload)?;
        let now_str = fmt_datetime(now);

        for _ in 0..INSERT_ATTEMPTS {
            let id = self.db().generate_id(PREFIX_QUEUE_ITEM).await?;
            let inserted = self
                .db()
                .execute(
                    "INSERT INTO queue_items (id, sync_job_id, site_id, license_number, entity_type,
                         operation_type, local_entity_id, remote_id, remote_label, payload, priority,
                         status, retry_count, max_retries, idempotency_key, depends_on_item_id,
                         created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'pending', 0, ?12, ?13, ?14, ?15, ?15)
                     ON CONFLICT DO NOTHING",
                    || {
                        libsql::params![
                            id.as_str(),
                            new.sync_job_id.as_str(),
                            new.site_id.as_str(),
                            new.license_number.as_str(),
                            new.entity_type.as_str(),
                            new.operation_type.as_str(),
                            new.local_entity_id.as_str(),
                            new.remote_id.as_deref(),
                            new.remote_label.as_deref(),
                            payload.as_str(),
                            i64::from(new.priority),
                            i64::from(new.max_retries),
                            new.idempotency_key.as_str(),
                            new.depends_on_item_id.as_deref(),
                            now_str.as_str()
                        ]
                    },
                )
                .await?;

            if inserted == 1 {
                return Ok((
                    QueueItem {
                        id,
                        sync_job_id: new.sync_job_id.clone(),
                        site_id: new.site_id.clone(),
                        license_number: new.license_number.clone(),
                        entity_type: new.entity_type,
                        operation_type: new.operation_type,
                        local_entity_id: new.local_entity_id.clone(),
                        remote_id: new.remote_id.clone(),
                        remote_label: new.remote_label.clone(),
                        payload: new.payload.clone(),
                        priority: new.priority,
                        status: QueueItemStatus::Pending,
                        retry_count: 0,
                        max_retries: new.max_retries,
                        idempotency_key: new.idempotency_key.clone(),
                        depends_on_item_id: new.depends_on_item_id.clone(),
                        last_error: None,
                        response_snapshot: None,
                        next_attempt_at: None,
                        claimed_by: None,
                        claimed_at: None,
                        created_at: now,
                        updated_at: now,
                        completed_at: None,
                    },
                    true,
                ));
            }

            if let Some(existing) = self.find_inflight_queue_item(&new.idempotency_key).await? {
                return Ok((existing, false));
            }
        }
        Err(DatabaseError::Contention(format!(
            "in-flight item for key {} changed during enqueue",
            new.idempotency_key
        )))
    }

    pub async fn get_queue_item(&self, id: &str) -> Result<QueueItem, DatabaseError> {
        self.db()
            .fetch_optional(
                &format!("SELECT {SELECT_COLS} FROM queue_items WHERE id = ?1"),
                || [id],
                row_to_item,
            )
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    /// The pending or processing item holding `idempotency_key`, if any.
    pub async fn find_inflight_queue_item(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<QueueItem>, DatabaseError> {
        self.db()
            .fetch_optional(
                &format!(
                    "SELECT {SELECT_COLS} FROM queue_items
                     WHERE idempotency_key = ?1 AND status IN ('pending', 'processing')"
                ),
                || [idempotency_key],
                row_to_item,
            )
            .await
    }

    /// Items of a job in delivery order, optionally filtered by status.
    pub async fn list_queue_items(
        &self,
        sync_job_id: &str,
        status: Option<QueueItemStatus>,
        limit: u32,
    ) -> Result<Vec<QueueItem>, DatabaseError> {
        match status {
            Some(status) => {
                self.db()
                    .fetch_all(
                        &format!(
                            "SELECT {SELECT_COLS} FROM queue_items
                             WHERE sync_job_id = ?1 AND status = ?2
                             ORDER BY priority, created_at, rowid LIMIT ?3"
                        ),
                        || libsql::params![sync_job_id, status.as_str(), i64::from(limit)],
                        row_to_item,
                    )
                    .await
            }
            None => {
                self.db()
                    .fetch_all(
                        &format!(
                            "SELECT {SELECT_COLS} FROM queue_items WHERE sync_job_id = ?1
                             ORDER BY priority, created_at, rowid LIMIT ?2"
                        ),
                        || libsql::params![sync_job_id, i64::from(limit)],
                        row_to_item,
                    )
                    .await
            }
        }
    }

    /// Number of items for a license in `status`.
    pub async fn count_queue_items(
        &self,
        license_number: &str,
        status: QueueItemStatus,
    ) -> Result<u32, DatabaseError> {
        self.db()
            .fetch_optional(
                "SELECT COUNT(*) FROM queue_items WHERE license_number = ?1 AND status = ?2",
                || libsql::params![license_number, status.as_str()],
                |row| get_u32(row, 0),
            )
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    /// Number of pending or processing items of a job.
    pub async fn count_inflight_items_for_job(
        &self,
        sync_job_id: &str,
    ) -> Result<u32, DatabaseError> {
        self.db()
            .fetch_optional(
                "SELECT COUNT(*) FROM queue_items
                 WHERE sync_job_id = ?1 AND status IN ('pending', 'processing')",
                || [sync_job_id],
                |row| get_u32(row, 0),
            )
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    /// Atomically claim up to `limit` ready items for a license.
    ///
    /// Ready means: `pending`, backoff gate passed, predecessor `completed`
    /// (or none), and the owning job `running` or `completed`. Claimed items
    /// move to `processing` stamped with `worker_id`. Results are in delivery
    /// order (priority, then creation time).
    pub async fn claim_ready_queue_items(
        &self,
        license_number: &str,
        limit: u32,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, DatabaseError> {
        let now = fmt_datetime(now);
        let mut items = self
            .db()
            .fetch_all(
                &format!(
                    "UPDATE queue_items
                     SET status = 'processing', claimed_by = ?3, claimed_at = ?4, updated_at = ?4
                     WHERE status = 'pending' AND id IN (
                         SELECT q.id FROM queue_items q
                         JOIN sync_jobs j ON j.id = q.sync_job_id
                         WHERE q.license_number = ?1
                           AND q.status = 'pending'
                           AND (q.next_attempt_at IS NULL OR q.next_attempt_at <= ?4)
                           AND j.status IN ('running', 'completed')
                           AND (q.depends_on_item_id IS NULL OR EXISTS (
                               SELECT 1 FROM queue_items d
                               WHERE d.id = q.depends_on_item_id AND d.status = 'completed'))
                         ORDER BY q.priority, q.created_at, q.rowid
                         LIMIT ?2)
                     RETURNING {SELECT_COLS}"
                ),
                || libsql::params![license_number, i64::from(limit), worker_id, now.as_str()],
                row_to_item,
            )
            .await?;
        items.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(items)
    }

    /// Mark a non-terminal item `completed`. `None` if it was already terminal.
    ///
    /// Remote identifiers only overwrite stored ones when provided.
    pub async fn complete_queue_item(
        &self,
        id: &str,
        remote_id: Option<&str>,
        remote_label: Option<&str>,
        response_snapshot: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueItem>, DatabaseError> {
        let now = fmt_datetime(now);
        self.db()
            .fetch_optional(
                &format!(
                    "UPDATE queue_items
                     SET status = 'completed',
                         remote_id = COALESCE(?2, remote_id),
                         remote_label = COALESCE(?3, remote_label),
                         response_snapshot = ?4,
                         next_attempt_at = NULL, claimed_by = NULL, claimed_at = NULL,
                         updated_at = ?5, completed_at = ?5
                     WHERE id = ?1 AND status IN ('pending', 'processing')
                     RETURNING {SELECT_COLS}"
                ),
                || libsql::params![id, remote_id, remote_label, response_snapshot, now.as_str()],
                row_to_item,
            )
            .await
    }

    /// Record a failed attempt computed from `expected_retry_count`.
    ///
    /// The update only applies if the item is still non-terminal and nobody
    /// else recorded a failure since it was read. `None` means the caller lost
    /// that race and should re-read.
    pub async fn record_queue_item_failure(
        &self,
        id: &str,
        expected_retry_count: u32,
        transition: FailureTransition,
        error: &ItemError,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueItem>, DatabaseError> {
        let now = fmt_datetime(now);
        let next_attempt_at = fmt_optional_datetime(next_attempt_at);
        let completed_at = transition.status.is_terminal().then_some(now.as_str());
        self.db()
            .fetch_optional(
                &format!(
                    "UPDATE queue_items
                     SET status = ?2, retry_count = ?3,
                         last_error_message = ?4, last_error_code = ?5, last_error_response = ?6,
                         response_snapshot = ?6,
                         next_attempt_at = ?7, claimed_by = NULL, claimed_at = NULL,
                         updated_at = ?8, completed_at = ?9
                     WHERE id = ?1 AND status IN ('pending', 'processing') AND retry_count = ?10
                     RETURNING {SELECT_COLS}"
                ),
                || {
                    libsql::params![
                        id,
                        transition.status.as_str(),
                        i64::from(transition.retry_count),
                        error.message.as_str(),
                        error.code.as_deref(),
                        error.response.as_deref(),
                        next_attempt_at.as_deref(),
                        now.as_str(),
                        completed_at,
                        i64::from(expected_retry_count)
                    ]
                },
                row_to_item,
            )
            .await
    }

    /// Skip every pending item of a job (job cancelled or failed), returning
    /// the skipped items so their dependents can be cascaded.
    pub async fn skip_pending_items_for_job(
        &self,
        sync_job_id: &str,
        code: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, DatabaseError> {
        let now = fmt_datetime(now);
        self.db()
            .fetch_all(
                &format!(
                    "UPDATE queue_items
                     SET status = 'skipped', last_error_message = ?3, last_error_code = ?2,
                         next_attempt_at = NULL, updated_at = ?4, completed_at = ?4
                     WHERE sync_job_id = ?1 AND status = 'pending'
                     RETURNING {SELECT_COLS}"
                ),
                || libsql::params![sync_job_id, code, message, now.as_str()],
                row_to_item,
            )
            .await
    }

    /// Skip a job's pending items whose predecessor already ended `failed`
    /// or `skipped`, returning them. Such items can never be claimed.
    pub async fn skip_stranded_queue_items(
        &self,
        sync_job_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, DatabaseError> {
        let now = fmt_datetime(now);
        self.db()
            .fetch_all(
                &format!(
                    "UPDATE queue_items
                     SET status = 'skipped',
                         last_error_message = 'predecessor ' || depends_on_item_id || ' did not complete',
                         last_error_code = ?2,
                         next_attempt_at = NULL, updated_at = ?3, completed_at = ?3
                     WHERE sync_job_id = ?1 AND status = 'pending'
                       AND depends_on_item_id IN (
                           SELECT d.id FROM queue_items d WHERE d.status IN ('failed', 'skipped'))
                     RETURNING {SELECT_COLS}"
                ),
                || libsql::params![sync_job_id, SKIP_DEPENDENCY_FAILED, now.as_str()],
                row_to_item,
            )
            .await
    }

    /// Skip one non-terminal item. `None` if it was already terminal.
    pub async fn skip_queue_item(
        &self,
        id: &str,
        code: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueItem>, DatabaseError> {
        let now = fmt_datetime(now);
        self.db()
            .fetch_optional(
                &format!(
                    "UPDATE queue_items
                     SET status = 'skipped', last_error_message = ?3, last_error_code = ?2,
                         next_attempt_at = NULL, claimed_by = NULL, claimed_at = NULL,
                         updated_at = ?4, completed_at = ?4
                     WHERE id = ?1 AND status IN ('pending', 'processing')
                     RETURNING {SELECT_COLS}"
                ),
                || libsql::params![id, code, message, now.as_str()],
                row_to_item,
            )
            .await
    }

    /// Skip the pending direct dependents of `item_id`, returning them.
    pub async fn skip_pending_dependents(
        &self,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, DatabaseError> {
        let now = fmt_datetime(now);
        let message = format!("predecessor {item_id} did not complete");
        self.db()
            .fetch_all(
                &format!(
                    "UPDATE queue_items
                     SET status = 'skipped', last_error_message = ?2, last_error_code = ?3,
                         next_attempt_at = NULL, updated_at = ?4, completed_at = ?4
                     WHERE depends_on_item_id = ?1 AND status = 'pending'
                     RETURNING {SELECT_COLS}"
                ),
                || libsql::params![item_id, message.as_str(), SKIP_DEPENDENCY_FAILED, now.as_str()],
                row_to_item,
            )
            .await
    }

    /// Skip older pending items for the same logical change under a different
    /// idempotency key. Returns the skipped items.
    pub async fn supersede_pending_queue_items(
        &self,
        license_number: &str,
        entity_type: EntityType,
        local_entity_id: &str,
        operation_type: OperationType,
        current_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, DatabaseError> {
        let now = fmt_datetime(now);
        let message = "superseded by a newer change";
        self.db()
            .fetch_all(
                &format!(
                    "UPDATE queue_items
                     SET status = 'skipped', last_error_message = ?6, last_error_code = ?7,
                         next_attempt_at = NULL, updated_at = ?8, completed_at = ?8
                     WHERE license_number = ?1 AND entity_type = ?2 AND local_entity_id = ?3
                       AND operation_type = ?4 AND idempotency_key <> ?5 AND status = 'pending'
                     RETURNING {SELECT_COLS}"
                ),
                || {
                    libsql::params![
                        license_number,
                        entity_type.as_str(),
                        local_entity_id,
                        operation_type.as_str(),
                        current_key,
                        message,
                        SKIP_SUPERSEDED,
                        now.as_str()
                    ]
                },
                row_to_item,
            )
            .await
    }

    /// Point pending dependents of `old_ids` at `new_id`.
    pub async fn repoint_dependents(
        &self,
        old_ids: &[String],
        new_id: &str,
    ) -> Result<u64, DatabaseError> {
        if old_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE queue_items SET depends_on_item_id = ?1
             WHERE status = 'pending' AND depends_on_item_id IN ({})",
            placeholders(2, old_ids.len())
        );
        let params: Vec<libsql::Value> = std::iter::once(new_id.into())
            .chain(old_ids.iter().map(|id| id.clone().into()))
            .collect();
        self.db()
            .execute(&sql, || libsql::params_from_iter(params.clone()))
            .await
    }

    /// Return a job's `failed` items, and items skipped because a predecessor
    /// failed, to `pending` with a fresh retry budget. Returns the reset count.
    ///
    /// Items whose key is held by another in-flight item are left alone.
    pub async fn reset_failed_queue_items(
        &self,
        sync_job_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let now = fmt_datetime(now);
        let reset = self
            .db()
            .fetch_all(
                "UPDATE OR IGNORE queue_items
                 SET status = 'pending', retry_count = 0, next_attempt_at = NULL,
                     claimed_by = NULL, claimed_at = NULL, completed_at = NULL, updated_at = ?3
                 WHERE sync_job_id = ?1
                   AND (status = 'failed' OR (status = 'skipped' AND last_error_code = ?2))
                 RETURNING id",
                || libsql::params![sync_job_id, SKIP_DEPENDENCY_FAILED, now.as_str()],
                |row| Ok(row.get::<String>(0)?),
            )
            .await?;
        Ok(reset.len() as u64)
    }

    /// Return `processing` items claimed before `claimed_before` to `pending`.
    pub async fn release_stale_queue_claims(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, DatabaseError> {
        let claimed_before = fmt_datetime(claimed_before);
        let now = fmt_datetime(now);
        self.db()
            .fetch_all(
                &format!(
                    "UPDATE queue_items
                     SET status = 'pending', claimed_by = NULL, claimed_at = NULL, updated_at = ?2
                     WHERE status = 'processing' AND claimed_at < ?1
                     RETURNING {SELECT_COLS}"
                ),
                || libsql::params![claimed_before.as_str(), now.as_str()],
                row_to_item,
            )
            .await
    }
}
