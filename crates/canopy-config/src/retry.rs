//! Retry policy for failed outbox items.

use std::time::Duration;

use canopy_core::enums::BackoffStrategy;
use serde::{Deserialize, Serialize};

const fn default_max_retries() -> u32 {
    3
}

const fn default_backoff_strategy() -> BackoffStrategy {
    BackoffStrategy::Exponential
}

const fn default_base_delay_ms() -> u64 {
    1000
}

const fn default_max_delay_ms() -> u64 {
    300_000
}

const fn default_rate_limit_delay_ms() -> u64 {
    60_000
}

const fn default_retry_permanent_errors() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Attempts allowed per item before it becomes terminal `failed`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// `fixed` or `exponential`.
    #[serde(default = "default_backoff_strategy")]
    pub backoff_strategy: BackoffStrategy,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap for exponential growth.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Delay applied after the regulator throttled a call.
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// When false, 4xx-style rejections fail the item without further retries.
    #[serde(default = "default_retry_permanent_errors")]
    pub retry_permanent_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_strategy: default_backoff_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            retry_permanent_errors: default_retry_permanent_errors(),
        }
    }
}

impl RetryConfig {
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub const fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(config.base_delay(), Duration::from_secs(1));
        assert_eq!(config.max_delay(), Duration::from_secs(300));
        assert_eq!(config.rate_limit_delay(), Duration::from_secs(60));
        assert!(config.retry_permanent_errors);
    }
}
