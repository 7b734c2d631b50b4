//! Retry policy for failed queue items.

use std::time::Duration;

use canopy_config::RetryConfig;
use canopy_core::enums::{BackoffStrategy, FailureKind};

/// How failed deliveries are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub strategy: BackoffStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub rate_limit_delay: Duration,
    pub retry_permanent_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            strategy: config.backoff_strategy,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            rate_limit_delay: config.rate_limit_delay(),
            retry_permanent_errors: config.retry_permanent_errors,
        }
    }

    /// Whether a failure of this kind may be retried at all.
    #[must_use]
    pub const fn is_retryable(&self, kind: FailureKind) -> bool {
        match kind {
            FailureKind::Transient | FailureKind::RateLimited => true,
            FailureKind::Permanent => self.retry_permanent_errors,
        }
    }

    /// Delay before the next attempt, given the item's retry count after
    /// recording this failure (1 for the first failure).
    #[must_use]
    pub fn delay_for(&self, kind: FailureKind, retry_count: u32) -> Duration {
        if kind == FailureKind::RateLimited {
            return self.rate_limit_delay;
        }
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let exponent = retry_count.saturating_sub(1).min(31);
                self.base_delay.saturating_mul(1u32 << exponent)
            }
        };
        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn policy(strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            strategy,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        }
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(4, 8)]
    #[case(5, 10)]
    #[case(60, 10)]
    fn exponential_doubles_and_caps(#[case] retry_count: u32, #[case] secs: u64) {
        let p = policy(BackoffStrategy::Exponential);
        assert_eq!(
            p.delay_for(FailureKind::Transient, retry_count),
            Duration::from_secs(secs)
        );
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    fn fixed_is_constant(#[case] retry_count: u32) {
        let p = policy(BackoffStrategy::Fixed);
        assert_eq!(
            p.delay_for(FailureKind::Transient, retry_count),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn rate_limited_uses_its_own_delay() {
        let p = policy(BackoffStrategy::Exponential);
        assert_eq!(p.delay_for(FailureKind::RateLimited, 1), p.rate_limit_delay);
    }

    #[test]
    fn permanent_errors_follow_config() {
        let mut p = RetryPolicy::default();
        assert!(p.is_retryable(FailureKind::Permanent));
        p.retry_permanent_errors = false;
        assert!(!p.is_retryable(FailureKind::Permanent));
        assert!(p.is_retryable(FailureKind::Transient));
    }
}
