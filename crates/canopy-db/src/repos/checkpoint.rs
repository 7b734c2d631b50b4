//! Checkpoint repository: incremental sync watermarks.

use chrono::{DateTime, Utc};

use canopy_core::entities::SyncCheckpoint;
use canopy_core::enums::{EntityType, SyncDirection};
use canopy_core::ids::PREFIX_CHECKPOINT;

use crate::error::DatabaseError;
use crate::helpers::{fmt_datetime, get_opt_datetime, get_opt_string, get_u32, parse_datetime, parse_enum};
use crate::service::CanopyService;

const SELECT_COLS: &str = "id, license_number, entity_type, direction, last_successful_sync_at, \
     last_sync_item_count, consecutive_failures, last_error, last_attempt_at, created_at, updated_at";

fn row_to_checkpoint(row: &libsql::Row) -> Result<SyncCheckpoint, DatabaseError> {
    Ok(SyncCheckpoint {
        id: row.get(0)?,
        license_number: row.get(1)?,
        entity_type: parse_enum(&row.get::<String>(2)?)?,
        direction: parse_enum(&row.get::<String>(3)?)?,
        last_successful_sync_at: get_opt_datetime(row, 4)?,
        last_sync_item_count: get_u32(row, 5)?,
        consecutive_failures: get_u32(row, 6)?,
        last_error: get_opt_string(row, 7)?,
        last_attempt_at: get_opt_datetime(row, 8)?,
        created_at: parse_datetime(&row.get::<String>(9)?)?,
        updated_at: parse_datetime(&row.get::<String>(10)?)?,
    })
}

impl CanopyService {
    pub async fn get_checkpoint(
        &self,
        license_number: &str,
        entity_type: EntityType,
        direction: SyncDirection,
    ) -> Result<Option<SyncCheckpoint>, DatabaseError> {
        self.db()
            .fetch_optional(
                &format!(
                    "SELECT {SELECT_COLS} FROM sync_checkpoints
                     WHERE license_number = ?1 AND entity_type = ?2 AND direction = ?3"
                ),
                || libsql::params![license_number, entity_type.as_str(), direction.as_str()],
                row_to_checkpoint,
            )
            .await
    }

    /// All checkpoints of a license, ordered by entity type then direction.
    pub async fn list_checkpoints(
        &self,
        license_number: &str,
    ) -> Result<Vec<SyncCheckpoint>, DatabaseError> {
        self.db()
            .fetch_all(
                &format!(
                    "SELECT {SELECT_COLS} FROM sync_checkpoints WHERE license_number = ?1
                     ORDER BY entity_type, direction"
                ),
                || [license_number],
                row_to_checkpoint,
            )
            .await
    }

    /// Advance the watermark after a successful pass and clear failure state.
    pub async fn record_checkpoint_success(
        &self,
        license_number: &str,
        entity_type: EntityType,
        direction: SyncDirection,
        watermark: DateTime<Utc>,
        item_count: u32,
        now: DateTime<Utc>,
    ) -> Result<SyncCheckpoint, DatabaseError> {
        let id = self.db().generate_id(PREFIX_CHECKPOINT).await?;
        let watermark = fmt_datetime(watermark);
        let now = fmt_datetime(now);
        self.db()
            .fetch_optional(
                &format!(
                    "INSERT INTO sync_checkpoints ({SELECT_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, ?7, ?7)
                     ON CONFLICT (license_number, entity_type, direction) DO UPDATE SET
                         last_successful_sync_at = excluded.last_successful_sync_at,
                         last_sync_item_count = excluded.last_sync_item_count,
                         consecutive_failures = 0,
                         last_error = NULL,
                         last_attempt_at = excluded.last_attempt_at,
                         updated_at = excluded.updated_at
                     RETURNING {SELECT_COLS}"
                ),
                || {
                    libsql::params![
                        id.as_str(),
                        license_number,
                        entity_type.as_str(),
                        direction.as_str(),
                        watermark.as_str(),
                        i64::from(item_count),
                        now.as_str()
                    ]
                },
                row_to_checkpoint,
            )
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    /// Count a failed pass. The watermark is left where it was.
    pub async fn record_checkpoint_failure(
        &self,
        license_number: &str,
        entity_type: EntityType,
        direction: SyncDirection,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<SyncCheckpoint, DatabaseError> {
        let id = self.db().generate_id(PREFIX_CHECKPOINT).await?;
        let now = fmt_datetime(now);
        self.db()
            .fetch_optional(
                &format!(
                    "INSERT INTO sync_checkpoints ({SELECT_COLS})
                     VALUES (?1, ?2, ?3, ?4, NULL, 0, 1, ?5, ?6, ?6, ?6)
                     ON CONFLICT (license_number, entity_type, direction) DO UPDATE SET
                         consecutive_failures = sync_checkpoints.consecutive_failures + 1,
                         last_error = excluded.last_error,
                         last_attempt_at = excluded.last_attempt_at,
                         updated_at = excluded.updated_at
                     RETURNING {SELECT_COLS}"
                ),
                || {
                    libsql::params![
                        id.as_str(),
                        license_number,
                        entity_type.as_str(),
                        direction.as_str(),
                        error,
                        now.as_str()
                    ]
                },
                row_to_checkpoint,
            )
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    /// Delete checkpoints of a license, optionally for one entity type.
    /// Returns the number removed.
    pub async fn reset_checkpoints(
        &self,
        license_number: &str,
        entity_type: Option<EntityType>,
    ) -> Result<u64, DatabaseError> {
        match entity_type {
            Some(entity_type) => {
                self.db()
                    .execute(
                        "DELETE FROM sync_checkpoints WHERE license_number = ?1 AND entity_type = ?2",
                        || libsql::params![license_number, entity_type.as_str()],
                    )
                    .await
            }
            None => {
                self.db()
                    .execute(
                        "DELETE FROM sync_checkpoints WHERE license_number = ?1",
                        || [license_number],
                    )
                    .await
            }
        }
    }
}
