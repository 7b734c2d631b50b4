//! # canopy-db
//!
//! libSQL persistence for the Canopy compliance sync engine.
//!
//! Stores licenses, sync jobs, outbox queue items, and sync checkpoints. Every
//! invariant that must hold across processes sharing the database file (one
//! active job per license, one in-flight item per idempotency key, exclusive
//! item claims) is enforced by a single SQL statement: partial unique indexes
//! plus conditional `UPDATE ... RETURNING`. No multi-statement transactions are
//! held open across `.await` points.

pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod retry;
pub mod service;
pub mod updates;

#[cfg(test)]
mod test_support;

use error::DatabaseError;
use libsql::Builder;
use libsql::params::IntoParams;
use retry::{RetryConfig, is_transient_lock_error};

/// Central database handle for all Canopy state.
///
/// Wraps a libSQL database and connection. Provides ID generation and
/// busy-aware statement helpers used by the repositories.
pub struct CanopyDb {
    /// Owns the local database the connection was opened from.
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
    retry: RetryConfig,
}

impl CanopyDb {
    /// Open a local database at the given path, or `":memory:"`.
    ///
    /// Runs migrations automatically on first open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys (must be per-connection in SQLite)
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        // Let SQLite wait on competing writers before surfacing SQLITE_BUSY.
        let mut rows = conn
            .query("PRAGMA busy_timeout = 5000", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA busy_timeout: {e}")))?;
        while rows.next().await?.is_some() {}

        let canopy_db = Self {
            db,
            conn,
            retry: RetryConfig::default(),
        };
        canopy_db.run_migrations().await?;
        tracing::debug!(path, "opened canopy database");
        Ok(canopy_db)
    }

    /// Replace the busy/locked retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Generate a prefixed ID via libSQL. Returns e.g., `"job-3fa81c02b9d4"`.
    ///
    /// Uses `randomblob(6)` in SQL to produce 12-char hex, then prepends the prefix.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self, prefix: &str) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT '{prefix}-' || lower(hex(randomblob(6)))"),
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }

    /// Execute a statement, retrying on lock contention.
    ///
    /// `params` is called once per attempt, so it must only borrow.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::LibSql` for non-transient failures or once
    /// attempts are exhausted.
    pub async fn execute<F, P>(&self, sql: &str, params: F) -> Result<u64, DatabaseError>
    where
        F: Fn() -> P,
        P: IntoParams,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.conn.execute(sql, params()).await {
                Ok(changed) => return Ok(changed),
                Err(e) if attempt < self.retry.max_attempts && is_transient_lock_error(&e) => {
                    self.backoff(attempt, &e).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run a query (including `... RETURNING`) and map every row, retrying
    /// on lock contention.
    ///
    /// Rows are views onto the live statement, so `map` runs on each row as
    /// the cursor reaches it.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::LibSql` for non-transient failures or once
    /// attempts are exhausted, or whatever `map` returns.
    pub async fn fetch_all<T, F, P, M>(
        &self,
        sql: &str,
        params: F,
        map: M,
    ) -> Result<Vec<T>, DatabaseError>
    where
        F: Fn() -> P,
        P: IntoParams,
        M: Fn(&libsql::Row) -> Result<T, DatabaseError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_fetch_all(sql, params(), &map).await {
                Err(DatabaseError::LibSql(ref e))
                    if attempt < self.retry.max_attempts && is_transient_lock_error(e) =>
                {
                    self.backoff(attempt, e).await;
                }
                result => return result,
            }
        }
    }

    /// Like [`Self::fetch_all`] but returns only the first mapped row.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query or `map` fails.
    pub async fn fetch_optional<T, F, P, M>(
        &self,
        sql: &str,
        params: F,
        map: M,
    ) -> Result<Option<T>, DatabaseError>
    where
        F: Fn() -> P,
        P: IntoParams,
        M: Fn(&libsql::Row) -> Result<T, DatabaseError>,
    {
        Ok(self.fetch_all(sql, params, map).await?.into_iter().next())
    }

    async fn try_fetch_all<T, M>(
        &self,
        sql: &str,
        params: impl IntoParams,
        map: &M,
    ) -> Result<Vec<T>, DatabaseError>
    where
        M: Fn(&libsql::Row) -> Result<T, DatabaseError>,
    {
        let mut rows = self.conn.query(sql, params).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map(&row)?);
        }
        Ok(out)
    }

    async fn backoff(&self, attempt: u32, error: &libsql::Error) {
        let delay = self.retry.delay_for(attempt);
        tracing::debug!(attempt, ?delay, %error, "database busy; retrying");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn test_db() -> CanopyDb {
        CanopyDb::open_local(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn open_local_creates_schema() {
        let db = test_db().await;
        for table in ["licenses", "sync_jobs", "queue_items", "sync_checkpoints"] {
            let row = db
                .fetch_optional(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    || [table],
                    |row| Ok(row.get::<String>(0)?),
                )
                .await
                .unwrap();
            assert!(row.is_some(), "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn partial_unique_indexes_exist() {
        let db = test_db().await;
        for index in ["idx_sync_jobs_one_active", "idx_queue_items_inflight_key"] {
            let row = db
                .fetch_optional(
                    "SELECT name FROM sqlite_master WHERE type='index' AND name=?1",
                    || [index],
                    |row| Ok(row.get::<String>(0)?),
                )
                .await
                .unwrap();
            assert!(row.is_some(), "index '{index}' should exist");
        }
    }

    #[tokio::test]
    async fn fetch_all_maps_every_row_in_order() {
        let db = test_db().await;
        db.execute("CREATE TABLE lots (label TEXT NOT NULL, weight INTEGER)", || ())
            .await
            .unwrap();
        for (label, weight) in [("1A4F01", 12), ("1A4F02", 0), ("1A4F03", 7)] {
            db.execute("INSERT INTO lots VALUES (?1, ?2)", || libsql::params![label, weight])
                .await
                .unwrap();
        }

        let lots = db
            .fetch_all(
                "SELECT label, weight FROM lots ORDER BY label",
                || (),
                |row| Ok((row.get::<String>(0)?, row.get::<i64>(1)?)),
            )
            .await
            .unwrap();

        assert_eq!(
            lots,
            vec![
                ("1A4F01".to_string(), 12),
                ("1A4F02".to_string(), 0),
                ("1A4F03".to_string(), 7),
            ]
        );
    }

    #[tokio::test]
    async fn fetch_optional_reads_returning_row() {
        let db = test_db().await;
        db.execute("CREATE TABLE lots (label TEXT NOT NULL)", || ())
            .await
            .unwrap();

        let label = db
            .fetch_optional(
                "INSERT INTO lots VALUES (?1) RETURNING label",
                || ["1A4F01"],
                |row| Ok(row.get::<String>(0)?),
            )
            .await
            .unwrap();

        assert_eq!(label.as_deref(), Some("1A4F01"));
    }

    #[tokio::test]
    async fn generate_id_correct_format() {
        let db = test_db().await;
        let id = db.generate_id("job").await.unwrap();
        assert!(id.starts_with("job-"), "ID should start with 'job-': {id}");
        assert_eq!(id.len(), 16, "3 prefix + 1 dash + 12 hex: {id}");
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn generate_id_all_prefixes() {
        let db = test_db().await;
        for prefix in canopy_core::ids::ALL_PREFIXES {
            let id = db.generate_id(prefix).await.unwrap();
            assert!(id.starts_with(&format!("{prefix}-")));
        }
    }

    #[tokio::test]
    async fn generate_id_uniqueness() {
        let db = test_db().await;
        let mut ids = HashSet::new();
        for _ in 0..100 {
            let id = db.generate_id("qit").await.unwrap();
            assert!(ids.insert(id.clone()), "Duplicate ID generated: {id}");
        }
    }

    #[tokio::test]
    async fn idempotent_migrations() {
        let db = test_db().await;
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn one_active_job_index_rejects_second_running_job() {
        let db = test_db().await;
        let insert = "INSERT INTO sync_jobs (id, site_id, license_number, state_code, direction, status, created_at)
                      VALUES (?1, 'site-1', 'CA-0001', 'CA', 'push', ?2, '2026-03-14T00:00:00.000000Z')";
        db.execute(insert, || ["job-a", "running"]).await.unwrap();
        assert!(db.execute(insert, || ["job-b", "pending"]).await.is_err());
        // Terminal rows don't participate.
        db.execute(insert, || ["job-c", "completed"]).await.unwrap();
    }
}
