use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{EntityType, OperationType, QueueItemStatus};
use crate::errors::CoreError;

/// Last recorded failure of a queue item.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ItemError {
    pub message: String,
    pub code: Option<String>,
    /// Raw regulator response body, if any.
    pub response: Option<String>,
}

/// A durable outbound mutation waiting for delivery to the regulator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct QueueItem {
    pub id: String,
    pub sync_job_id: String,
    pub site_id: String,
    pub license_number: String,
    pub entity_type: EntityType,
    pub operation_type: OperationType,
    pub local_entity_id: String,
    pub remote_id: Option<String>,
    pub remote_label: Option<String>,
    pub payload: serde_json::Value,
    /// Lower is sooner.
    pub priority: i32,
    pub status: QueueItemStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub idempotency_key: String,
    pub depends_on_item_id: Option<String>,
    pub last_error: Option<ItemError>,
    /// Successful response snapshot, or the failing one alongside `last_error`.
    pub response_snapshot: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    #[must_use]
    pub const fn retries_remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }

    /// # Errors
    ///
    /// `CoreError::InvalidTransition` if the item's state machine forbids
    /// moving to `next`.
    pub fn ensure_transition(&self, next: QueueItemStatus) -> Result<(), CoreError> {
        if self.status.can_transition_to(next) {
            return Ok(());
        }
        Err(CoreError::InvalidTransition {
            entity: "queue item",
            id: self.id.clone(),
            from: self.status.to_string(),
            to: next.to_string(),
        })
    }
}

/// Deterministic key deduplicating in-flight work for one logical change.
///
/// Scoped to a UTC calendar day: the same change enqueued again on the same
/// day collapses onto the in-flight item, while the next day is new work.
#[must_use]
pub fn idempotency_key(
    license_number: &str,
    entity_type: EntityType,
    local_entity_id: &str,
    operation: OperationType,
    date: NaiveDate,
) -> String {
    format!(
        "{license_number}:{entity_type}:{local_entity_id}:{operation}:{}",
        date.format("%Y%m%d")
    )
}

/// Outcome of recording one failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTransition {
    pub status: QueueItemStatus,
    pub retry_count: u32,
}

impl FailureTransition {
    #[must_use]
    pub const fn will_retry(self) -> bool {
        matches!(self.status, QueueItemStatus::Pending)
    }
}

/// Apply one failure to an item's retry counter.
///
/// The counter always increments. The item returns to `Pending` while
/// `retry_count < max_retries`, otherwise it becomes terminal `Failed`.
/// A non-retryable failure goes straight to `Failed`.
#[must_use]
pub const fn next_after_failure(
    retry_count: u32,
    max_retries: u32,
    retryable: bool,
) -> FailureTransition {
    let retry_count = retry_count.saturating_add(1);
    let status = if retryable && retry_count < max_retries {
        QueueItemStatus::Pending
    } else {
        QueueItemStatus::Failed
    };
    FailureTransition {
        status,
        retry_count,
    }
}
