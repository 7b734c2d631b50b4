//! Sync job repository: atomic start, lifecycle transitions, completion.
//!
//! Item counters are maintained by triggers on `queue_items` (see the
//! migration), so this module never increments them directly.

use chrono::{DateTime, Utc};

use canopy_core::entities::{JobCounts, License, SyncJob};
use canopy_core::enums::{SyncDirection, SyncJobStatus};
use canopy_core::ids::PREFIX_SYNC_JOB;

use crate::error::DatabaseError;
use crate::helpers::{fmt_datetime, get_bool, get_opt_datetime, get_opt_string, get_u32, parse_datetime, parse_enum};
use crate::service::CanopyService;

const SELECT_COLS: &str = "id, site_id, license_number, state_code, direction, status, \
     force_full_sync, initiated_by, sealed, total_count, processed_count, successful_count, \
     failed_count, retry_count, error_message, created_at, started_at, completed_at";

/// Attempts at insert-or-fetch before giving up. A retry is only needed when
/// the blocking job finishes between the insert and the lookup.
const START_ATTEMPTS: usize = 3;

fn row_to_job(row: &libsql::Row) -> Result<SyncJob, DatabaseError> {
    Ok(SyncJob {
        id: row.get(0)?,
        site_id: row.get(1)?,
        license_number: row.get(2)?,
        state_code: row.get(3)?,
        direction: parse_enum(&row.get::<String>(4)?)?,
        status: parse_enum(&row.get::<String>(5)?)?,
        force_full_sync: get_bool(row, 6)?,
        initiated_by: get_opt_string(row, 7)?,
        sealed: get_bool(row, 8)?,
        counts: JobCounts {
            total: get_u32(row, 9)?,
            processed: get_u32(row, 10)?,
            successful: get_u32(row, 11)?,
            failed: get_u32(row, 12)?,
        },
        retry_count: get_u32(row, 13)?,
        error_message: get_opt_string(row, 14)?,
        created_at: parse_datetime(&row.get::<String>(15)?)?,
        started_at: get_opt_datetime(row, 16)?,
        completed_at: get_opt_datetime(row, 17)?,
    })
}

/// Fields for a new sync job.
#[derive(Debug, Clone)]
pub struct NewSyncJob {
    pub site_id: String,
    pub license_number: String,
    pub state_code: String,
    pub direction: SyncDirection,
    pub force_full_sync: bool,
    pub initiated_by: Option<String>,
}

impl NewSyncJob {
    /// A job for `license` that starts directly in `Running`.
    #[must_use]
    pub fn running(license: &License, direction: SyncDirection) -> Self {
        Self {
            site_id: license.site_id.clone(),
            license_number: license.license_number.clone(),
            state_code: license.state_code.clone(),
            direction,
            force_full_sync: false,
            initiated_by: None,
        }
    }

    #[must_use]
    pub fn force_full_sync(mut self, force: bool) -> Self {
        self.force_full_sync = force;
        self
    }

    #[must_use]
    pub fn initiated_by(mut self, initiator: Option<String>) -> Self {
        self.initiated_by = initiator;
        self
    }
}

impl CanopyService {
    /// Insert a running job unless the license already has a non-terminal one.
    ///
    /// Returns `(job, true)` for a new row, or `(existing, false)` when another
    /// job is active. The check and insert are one statement against the
    /// `idx_sync_jobs_one_active` partial unique index, so the invariant holds
    /// across processes.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Contention` if the active job keeps changing
    /// underneath the insert.
    pub async fn insert_sync_job_if_idle(
        &self,
        new: &NewSyncJob,
    ) -> Result<(SyncJob, bool), DatabaseError> {
        for _ in 0..START_ATTEMPTS {
            let now = Utc::now();
            let now_str = fmt_datetime(now);
            let id = self.db().generate_id(PREFIX_SYNC_JOB).await?;

            let inserted = self
                .db()
                .execute(
                    "INSERT INTO sync_jobs (id, site_id, license_number, state_code, direction,
                         status, force_full_sync, initiated_by, sealed, created_at, started_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)
                     ON CONFLICT DO NOTHING",
                    || {
                        libsql::params![
                            id.as_str(),
                            new.site_id.as_str(),
                            new.license_number.as_str(),
                            new.state_code.as_str(),
                            new.direction.as_str(),
                            SyncJobStatus::Running.as_str(),
                            i64::from(new.force_full_sync),
                            new.initiated_by.as_deref(),
                            now_str.as_str()
                        ]
                    },
                )
                .await?;

            if inserted == 1 {
                return Ok((
                    SyncJob {
                        id,
                        site_id: new.site_id.clone(),
                        license_number: new.license_number.clone(),
                        state_code: new.state_code.clone(),
                        direction: new.direction,
                        status: SyncJobStatus::Running,
                        force_full_sync: new.force_full_sync,
                        initiated_by: new.initiated_by.clone(),
                        sealed: false,
                        counts: JobCounts::default(),
                        retry_count: 0,
                        error_message: None,
                        created_at: now,
                        started_at: Some(now),
                        completed_at: None,
                    },
                    true,
                ));
            }

            if let Some(active) = self.get_active_sync_job(&new.license_number).await? {
                return Ok((active, false));
            }
        }
        Err(DatabaseError::Contention(format!(
            "active job for license {} changed during start",
            new.license_number
        )))
    }

    pub async fn get_sync_job(&self, id: &str) -> Result<SyncJob, DatabaseError> {
        self.db()
            .fetch_optional(
                &format!("SELECT {SELECT_COLS} FROM sync_jobs WHERE id = ?1"),
                || [id],
                row_to_job,
            )
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    /// The license's non-terminal job, if any.
    pub async fn get_active_sync_job(
        &self,
        license_number: &str,
    ) -> Result<Option<SyncJob>, DatabaseError> {
        self.db()
            .fetch_optional(
                &format!(
                    "SELECT {SELECT_COLS} FROM sync_jobs
                     WHERE license_number = ?1 AND status IN ('pending', 'running')"
                ),
                || [license_number],
                row_to_job,
            )
            .await
    }

    /// Every pending or running job, oldest first.
    pub async fn list_active_sync_jobs(&self) -> Result<Vec<SyncJob>, DatabaseError> {
        self.db()
            .fetch_all(
                &format!(
                    "SELECT {SELECT_COLS} FROM sync_jobs
                     WHERE status IN ('pending', 'running')
                     ORDER BY created_at, rowid"
                ),
                || (),
                row_to_job,
            )
            .await
    }

    /// Jobs for a site, newest first.
    pub async fn list_sync_jobs(
        &self,
        site_id: &str,
        limit: u32,
    ) -> Result<Vec<SyncJob>, DatabaseError> {
        self.db()
            .fetch_all(
                &format!(
                    "SELECT {SELECT_COLS} FROM sync_jobs WHERE site_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ),
                || libsql::params![site_id, i64::from(limit)],
                row_to_job,
            )
            .await
    }

    /// Jobs for a license, newest first.
    pub async fn list_sync_jobs_for_license(
        &self,
        license_number: &str,
        limit: u32,
    ) -> Result<Vec<SyncJob>, DatabaseError> {
        self.db()
            .fetch_all(
                &format!(
                    "SELECT {SELECT_COLS} FROM sync_jobs WHERE license_number = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ),
                || libsql::params![license_number, i64::from(limit)],
                row_to_job,
            )
            .await
    }

    /// Mark the job as fully enqueued. Returns `false` if the job is terminal.
    pub async fn seal_sync_job(&self, id: &str) -> Result<bool, DatabaseError> {
        let changed = self
            .db()
            .execute(
                "UPDATE sync_jobs SET sealed = 1
                 WHERE id = ?1 AND status IN ('pending', 'running')",
                || [id],
            )
            .await?;
        Ok(changed == 1)
    }

    /// Complete a sealed, running job that has no non-terminal items left.
    ///
    /// Returns the completed job, or `None` if any condition does not hold.
    /// Safe to call after every item transition: at most one caller wins.
    pub async fn try_complete_sync_job(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncJob>, DatabaseError> {
        let now = fmt_datetime(now);
        self.db()
            .fetch_optional(
                &format!(
                    "UPDATE sync_jobs SET status = 'completed', completed_at = ?2
                     WHERE id = ?1 AND status = 'running' AND sealed = 1
                       AND NOT EXISTS (
                           SELECT 1 FROM queue_items
                           WHERE sync_job_id = ?1 AND status IN ('pending', 'processing'))
                     RETURNING {SELECT_COLS}"
                ),
                || libsql::params![id, now.as_str()],
                row_to_job,
            )
            .await
    }

    /// Move a non-terminal job to `Cancelled`. `None` if it was already terminal.
    pub async fn cancel_sync_job(
        &self,
        id: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncJob>, DatabaseError> {
        self.finish_sync_job(id, SyncJobStatus::Cancelled, reason, now)
            .await
    }

    /// Move a non-terminal job to `Failed`. `None` if it was already terminal.
    pub async fn fail_sync_job(
        &self,
        id: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncJob>, DatabaseError> {
        self.finish_sync_job(id, SyncJobStatus::Failed, Some(message), now)
            .await
    }

    async fn finish_sync_job(
        &self,
        id: &str,
        status: SyncJobStatus,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncJob>, DatabaseError> {
        let now = fmt_datetime(now);
        self.db()
            .fetch_optional(
                &format!(
                    "UPDATE sync_jobs
                     SET status = ?2, error_message = COALESCE(?3, error_message), completed_at = ?4
                     WHERE id = ?1 AND status IN ('pending', 'running')
                     RETURNING {SELECT_COLS}"
                ),
                || libsql::params![id, status.as_str(), message, now.as_str()],
                row_to_job,
            )
            .await
    }

    /// Count an operator retry against the job.
    pub async fn increment_sync_job_retry(&self, id: &str) -> Result<(), DatabaseError> {
        self.db()
            .execute(
                "UPDATE sync_jobs SET retry_count = retry_count + 1 WHERE id = ?1",
                || [id],
            )
            .await?;
        Ok(())
    }
}
