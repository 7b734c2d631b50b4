//! Embedded schema migrations, applied in order on every open.
//!
//! Statements use `IF NOT EXISTS`, so re-applying a migration against an
//! existing database is a no-op.

use crate::CanopyDb;
use crate::error::DatabaseError;

/// Ordered `(name, sql)` pairs.
///
/// `001_initial`: licenses, sync jobs, the outbox and checkpoints, with the
/// partial unique indexes for active jobs and in-flight idempotency keys and
/// the triggers that keep job counters current.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../migrations/001_initial.sql"),
)];

impl CanopyDb {
    pub(crate) async fn run_migrations(&self) -> Result<(), DatabaseError> {
        for (name, sql) in MIGRATIONS {
            self.conn
                .execute_batch(sql)
                .await
                .map_err(|e| DatabaseError::Migration(format!("{name}: {e}")))?;
            tracing::debug!(migration = name, "migration applied");
        }
        Ok(())
    }
}
