//! Sync engine runtime configuration.

use std::time::Duration;

use canopy_core::enums::EntityType;
use serde::{Deserialize, Serialize};

const fn default_batch_size() -> u32 {
    25
}

const fn default_worker_concurrency() -> u32 {
    4
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_claim_timeout_secs() -> u64 {
    300
}

const fn default_request_timeout_secs() -> u64 {
    30
}

fn default_entity_types() -> Vec<EntityType> {
    EntityType::ALL.to_vec()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Maximum items claimed per `GetNextBatch` call.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Items delivered concurrently per license worker.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: u32,

    /// Idle delay between empty polls of a long-running worker.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Claims older than this are considered abandoned and released.
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,

    /// Upper bound for a single regulator call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Regulator modules covered by pull/push phases, in processing order.
    #[serde(default = "default_entity_types")]
    pub entity_types: Vec<EntityType>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            worker_concurrency: default_worker_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            claim_timeout_secs: default_claim_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            entity_types: default_entity_types(),
        }
    }
}

impl SyncConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.claim_timeout(), Duration::from_secs(300));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.entity_types.len(), EntityType::ALL.len());
    }
}
