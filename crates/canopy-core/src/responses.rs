//! Operator-facing response types.
//!
//! These structs define the shape of JSON returned by the orchestrator entry
//! points and printed by `canopy` commands like `canopy sync start` and
//! `canopy sync status`.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::{SyncCheckpoint, SyncJob};
use crate::enums::{EntityType, SyncDirection};

/// Response from `StartSync`.
///
/// `created == false` means a sync was already in progress for the license and
/// `job` is that existing run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StartSyncResponse {
    pub job: SyncJob,
    pub created: bool,
    pub message: String,
}

/// Per-entity checkpoint summary inside a status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub entity_type: EntityType,
    pub direction: SyncDirection,
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    pub last_sync_item_count: u32,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl From<&SyncCheckpoint> for CheckpointSummary {
    fn from(cp: &SyncCheckpoint) -> Self {
        Self {
            entity_type: cp.entity_type,
            direction: cp.direction,
            last_successful_sync_at: cp.last_successful_sync_at,
            last_sync_item_count: cp.last_sync_item_count,
            consecutive_failures: cp.consecutive_failures,
            last_error: cp.last_error.clone(),
        }
    }
}

/// Response from `GetSyncStatus`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SyncStatusResponse {
    pub license_number: String,
    pub active_job: Option<SyncJob>,
    pub pending_count: u32,
    pub failed_count: u32,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub checkpoints: Vec<CheckpointSummary>,
}

/// Response from `CancelSyncJob`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CancelSyncResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// Response from `RetryFailedItems`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RetryFailedResponse {
    pub job_id: String,
    pub reset_count: u32,
}
