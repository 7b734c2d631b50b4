//! Status enums, directions, and regulator vocabularies for Canopy.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`.
//! Status enums with state machines provide `allowed_next_states()` to enforce
//! valid transitions at the application layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// SyncDirection
// ---------------------------------------------------------------------------

/// Which way data flows between the local system of record and the regulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local mutations delivered to the regulator through the outbox.
    Push,
    /// Regulator-side changes pulled into the local store.
    Pull,
    Bidirectional,
}

impl SyncDirection {
    #[must_use]
    pub const fn includes_pull(self) -> bool {
        matches!(self, Self::Pull | Self::Bidirectional)
    }

    #[must_use]
    pub const fn includes_push(self) -> bool {
        matches!(self, Self::Push | Self::Bidirectional)
    }

    /// Checkpoints are tracked per single direction; `Bidirectional` has no
    /// watermark of its own.
    #[must_use]
    pub const fn is_checkpointable(self) -> bool {
        !matches!(self, Self::Bidirectional)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SyncJobStatus
// ---------------------------------------------------------------------------

/// Status of a sync job.
///
/// ```text
/// pending → running → completed
///                   → failed
///                   → cancelled
/// pending → cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncJobStatus {
    /// Statuses that count towards the one-active-job-per-license invariant.
    pub const ACTIVE: &'static [Self] = &[Self::Pending, Self::Running];

    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Running, Self::Cancelled, Self::Failed],
            Self::Running => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SyncJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// QueueItemStatus
// ---------------------------------------------------------------------------

/// Status of an outbox queue item.
///
/// ```text
/// pending → processing → completed
///                      → pending   (failure, retries remain)
///                      → failed    (retries exhausted)
/// pending → completed | failed | skipped (superseded, dependency failed, job stopped)
/// failed  → pending   (operator retry)
/// skipped → pending   (operator retry of a dependency-failed skip)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    /// Claimed by a worker; transient.
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl QueueItemStatus {
    /// Statuses covered by the in-flight idempotency key uniqueness.
    pub const NON_TERMINAL: &'static [Self] = &[Self::Pending, Self::Processing];

    #[must_use]
    #[allow(clippy::match_same_arms)]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Pending => &[
                Self::Pending,
                Self::Processing,
                Self::Completed,
                Self::Failed,
                Self::Skipped,
            ],
            Self::Processing => &[Self::Pending, Self::Completed, Self::Failed, Self::Skipped],
            Self::Failed => &[Self::Pending],
            Self::Skipped => &[Self::Pending],
            Self::Completed => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

/// Regulator module a record belongs to. Each maps to one API adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Plant,
    PlantBatch,
    Harvest,
    Package,
    Item,
    Strain,
    Location,
    LabTest,
    ProcessingJob,
}

impl EntityType {
    /// Every regulator module, in pull order: reference data before the
    /// records that point at it.
    pub const ALL: &'static [Self] = &[
        Self::Location,
        Self::Strain,
        Self::Item,
        Self::PlantBatch,
        Self::Plant,
        Self::Harvest,
        Self::Package,
        Self::LabTest,
        Self::ProcessingJob,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plant => "plant",
            Self::PlantBatch => "plant_batch",
            Self::Harvest => "harvest",
            Self::Package => "package",
            Self::Item => "item",
            Self::Strain => "strain",
            Self::Location => "location",
            Self::LabTest => "lab_test",
            Self::ProcessingJob => "processing_job",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OperationType
// ---------------------------------------------------------------------------

/// Mutation delivered to the regulator for a local entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Move,
    Adjust,
    Finish,
    Destroy,
}

impl OperationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Move => "move",
            Self::Adjust => "adjust",
            Self::Finish => "finish",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FailureKind
// ---------------------------------------------------------------------------

/// Classification of a failed regulator call.
///
/// Stored as the item's error code when the adapter supplies none, so that
/// operators can tell throttling apart from data problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network errors, timeouts, 5xx.
    Transient,
    /// The regulator throttled the call.
    RateLimited,
    /// 4xx-style validation rejection from the regulator.
    Permanent,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::RateLimited => "rate_limited",
            Self::Permanent => "permanent",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BackoffStrategy
// ---------------------------------------------------------------------------

/// Delay curve applied between retries of a failed queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

impl BackoffStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Exponential => "exponential",
        }
    }
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
