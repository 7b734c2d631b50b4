use std::sync::Arc;

use anyhow::Context;
use canopy_config::CanopyConfig;
use canopy_db::service::CanopyService;
use canopy_sync::{CheckpointStore, QueueManager, RetryPolicy, SyncOrchestrator};

/// Shared application resources initialized once at startup.
///
/// The CLI carries no regulator adapters, so it drives the orchestrator's
/// bookkeeping only; delivery runs in a process that registers adapters.
pub struct AppContext {
    pub service: Arc<CanopyService>,
    pub config: CanopyConfig,
    pub orchestrator: SyncOrchestrator,
}

impl AppContext {
    pub async fn init(config: CanopyConfig) -> anyhow::Result<Self> {
        let service = CanopyService::new_local(&config.database.path)
            .await
            .with_context(|| format!("failed to open database at {}", config.database.path))?;
        let service = Arc::new(service);
        tracing::debug!(path = %config.database.path, "database opened");

        let queue = QueueManager::new(
            Arc::clone(&service),
            RetryPolicy::from_config(&config.retry),
        );
        let checkpoints = CheckpointStore::new(Arc::clone(&service));
        let orchestrator = SyncOrchestrator::new(Arc::clone(&service), queue, checkpoints);

        Ok(Self {
            service,
            config,
            orchestrator,
        })
    }
}
