use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{SyncDirection, SyncJobStatus};

/// Aggregated item outcomes for one sync job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct JobCounts {
    pub total: u32,
    pub processed: u32,
    pub successful: u32,
    pub failed: u32,
}

/// One synchronization run for a license.
///
/// At most one non-terminal job exists per license at any time.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SyncJob {
    pub id: String,
    pub site_id: String,
    pub license_number: String,
    pub state_code: String,
    pub direction: SyncDirection,
    pub status: SyncJobStatus,
    pub force_full_sync: bool,
    pub initiated_by: Option<String>,
    /// Set once the run has finished enqueueing work. Completion is only
    /// evaluated for sealed jobs.
    pub sealed: bool,
    pub counts: JobCounts,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Share of enqueued items that reached a terminal state, 0–100.
    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        if self.counts.total == 0 {
            return if self.status.is_terminal() { 100.0 } else { 0.0 };
        }
        f64::from(self.counts.processed) / f64::from(self.counts.total) * 100.0
    }

    /// Wall-clock run time, if the job has both started and finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }
}
