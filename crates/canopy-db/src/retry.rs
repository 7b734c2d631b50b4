//! Busy/locked retry logic for shared database files.
//!
//! Several `canopy` processes (scheduler, workers, operator CLI) may write the
//! same libSQL file. `SQLite` serializes writers, so a competing writer
//! surfaces as `SQLITE_BUSY` / `database is locked`. These resolve once the
//! other transaction commits, so writes are retried with capped exponential
//! backoff.

use std::time::Duration;

/// Configuration for retry behavior on busy/locked errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial one).
    pub max_attempts: u32,
    /// Initial delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay between retries (backoff is capped here).
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Detect lock contention errors.
///
/// The predicate is intentionally narrow to avoid retrying genuine
/// SQL or constraint errors.
pub fn is_transient_lock_error(e: &libsql::Error) -> bool {
    let msg = e.to_string();
    msg.contains("database is locked")
        || msg.contains("database table is locked")
        || msg.contains("SQLITE_BUSY")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_caps() {
        let cfg = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(cfg.delay_for(1), Duration::from_millis(100));
        assert_eq!(cfg.delay_for(2), Duration::from_millis(200));
        assert_eq!(cfg.delay_for(3), Duration::from_millis(400));
        assert_eq!(cfg.delay_for(4), Duration::from_millis(500));
        assert_eq!(cfg.delay_for(30), Duration::from_millis(500));
    }

    #[test]
    fn constraint_errors_are_not_transient() {
        let err = libsql::Error::SqliteFailure(19, "UNIQUE constraint failed: licenses.license_number".into());
        assert!(!is_transient_lock_error(&err));
    }

    #[test]
    fn locked_errors_are_transient() {
        let err = libsql::Error::SqliteFailure(5, "database is locked".into());
        assert!(is_transient_lock_error(&err));
    }
}
