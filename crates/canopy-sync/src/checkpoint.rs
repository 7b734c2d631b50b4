//! Checkpoint store: per (license, entity type, direction) watermarks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use canopy_core::entities::SyncCheckpoint;
use canopy_core::enums::{EntityType, SyncDirection};
use canopy_db::service::CanopyService;

use crate::error::SyncError;

/// Outcome of one pull or push pass, as recorded by [`CheckpointStore::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Succeeded {
        /// New watermark: the time the pass started.
        watermark: DateTime<Utc>,
        item_count: u32,
    },
    Failed {
        error: String,
    },
}

#[derive(Clone)]
pub struct CheckpointStore {
    service: Arc<CanopyService>,
}

impl CheckpointStore {
    pub const fn new(service: Arc<CanopyService>) -> Self {
        Self { service }
    }

    /// The checkpoint, or `None` if the tuple was never synced (full pull).
    pub async fn get(
        &self,
        license_number: &str,
        entity_type: EntityType,
        direction: SyncDirection,
    ) -> Result<Option<SyncCheckpoint>, SyncError> {
        Ok(self
            .service
            .get_checkpoint(license_number, entity_type, direction)
            .await?)
    }

    /// Record a pass. Success moves the watermark and clears the failure
    /// streak; failure extends the streak and leaves the watermark alone.
    pub async fn upsert(
        &self,
        license_number: &str,
        entity_type: EntityType,
        direction: SyncDirection,
        outcome: PassOutcome,
    ) -> Result<SyncCheckpoint, SyncError> {
        let now = Utc::now();
        match outcome {
            PassOutcome::Succeeded {
                watermark,
                item_count,
            } => {
                let cp = self
                    .service
                    .record_checkpoint_success(
                        license_number,
                        entity_type,
                        direction,
                        watermark,
                        item_count,
                        now,
                    )
                    .await?;
                info!(
                    license = license_number,
                    entity_type = %entity_type,
                    direction = %direction,
                    item_count,
                    "checkpoint advanced"
                );
                Ok(cp)
            }
            PassOutcome::Failed { error } => {
                let cp = self
                    .service
                    .record_checkpoint_failure(license_number, entity_type, direction, &error, now)
                    .await?;
                warn!(
                    license = license_number,
                    entity_type = %entity_type,
                    direction = %direction,
                    consecutive_failures = cp.consecutive_failures,
                    error = %error,
                    "checkpoint failure recorded"
                );
                Ok(cp)
            }
        }
    }

    pub async fn record_success(
        &self,
        license_number: &str,
        entity_type: EntityType,
        direction: SyncDirection,
        watermark: DateTime<Utc>,
        item_count: u32,
    ) -> Result<SyncCheckpoint, SyncError> {
        self.upsert(
            license_number,
            entity_type,
            direction,
            PassOutcome::Succeeded {
                watermark,
                item_count,
            },
        )
        .await
    }

    pub async fn record_failure(
        &self,
        license_number: &str,
        entity_type: EntityType,
        direction: SyncDirection,
        error: impl Into<String>,
    ) -> Result<SyncCheckpoint, SyncError> {
        self.upsert(
            license_number,
            entity_type,
            direction,
            PassOutcome::Failed {
                error: error.into(),
            },
        )
        .await
    }

    /// Clear watermarks so the next pull is a full resync.
    pub async fn reset(
        &self,
        license_number: &str,
        entity_type: Option<EntityType>,
    ) -> Result<u32, SyncError> {
        let removed = self
            .service
            .reset_checkpoints(license_number, entity_type)
            .await?;
        info!(
            license = license_number,
            entity_type = entity_type.map_or("all", EntityType::as_str),
            removed,
            "checkpoints reset"
        );
        Ok(u32::try_from(removed).unwrap_or(u32::MAX))
    }

    pub async fn list(&self, license_number: &str) -> Result<Vec<SyncCheckpoint>, SyncError> {
        Ok(self.service.list_checkpoints(license_number).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::*;

    async fn store() -> CheckpointStore {
        let svc = CanopyService::new_local(":memory:").await.unwrap();
        CheckpointStore::new(Arc::new(svc))
    }

    #[tokio::test]
    async fn failure_keeps_watermark_and_success_clears_streak() {
        let store = store().await;
        let t0 = Utc::now() - Duration::hours(1);
        store
            .record_success("CA-0001", EntityType::Package, SyncDirection::Pull, t0, 12)
            .await
            .unwrap();
        let failed = store
            .record_failure("CA-0001", EntityType::Package, SyncDirection::Pull, "503")
            .await
            .unwrap();
        assert_eq!(failed.consecutive_failures, 1);
        assert_eq!(failed.last_sync_item_count, 12);
        assert!(failed.watermark().is_some());

        let t1 = Utc::now();
        let ok = store
            .record_success("CA-0001", EntityType::Package, SyncDirection::Pull, t1, 3)
            .await
            .unwrap();
        assert_eq!(ok.consecutive_failures, 0);
        assert!(ok.last_error.is_none());
        assert!(ok.watermark().unwrap() > failed.watermark().unwrap());
    }

    #[tokio::test]
    async fn reset_forces_full_pull() {
        let store = store().await;
        for et in [EntityType::Plant, EntityType::Package] {
            store
                .record_success("CA-0001", et, SyncDirection::Pull, Utc::now(), 1)
                .await
                .unwrap();
        }
        assert_eq!(store.reset("CA-0001", Some(EntityType::Plant)).await.unwrap(), 1);
        assert!(
            store
                .get("CA-0001", EntityType::Plant, SyncDirection::Pull)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(store.list("CA-0001").await.unwrap().len(), 1);
        assert_eq!(store.reset("CA-0001", None).await.unwrap(), 1);
        assert!(store.list("CA-0001").await.unwrap().is_empty());
    }
}
