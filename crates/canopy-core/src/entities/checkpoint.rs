use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{EntityType, SyncDirection};

/// Incremental sync watermark for one (license, entity type, direction).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SyncCheckpoint {
    pub id: String,
    pub license_number: String,
    pub entity_type: EntityType,
    pub direction: SyncDirection,
    /// The watermark. `None` means the next pass is a full sync.
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    pub last_sync_item_count: u32,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncCheckpoint {
    #[must_use]
    pub const fn watermark(&self) -> Option<DateTime<Utc>> {
        self.last_successful_sync_at
    }

    #[must_use]
    pub const fn is_failing(&self) -> bool {
        self.consecutive_failures > 0
    }
}
