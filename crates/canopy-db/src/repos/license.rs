//! License repository.

use chrono::{DateTime, Utc};

use canopy_core::entities::License;
use canopy_core::ids::PREFIX_LICENSE;

use crate::error::DatabaseError;
use crate::helpers::{fmt_datetime, get_bool, get_opt_datetime, get_opt_string, get_opt_u32, parse_datetime};
use crate::service::CanopyService;
use crate::updates::license::LicenseUpdate;

const SELECT_COLS: &str = "id, site_id, license_number, state_code, credential_ref, is_active, \
     auto_sync_enabled, auto_sync_interval_minutes, last_sync_at, last_successful_sync_at, \
     last_sync_error, created_at, updated_at";

fn row_to_license(row: &libsql::Row) -> Result<License, DatabaseError> {
    Ok(License {
        id: row.get(0)?,
        site_id: row.get(1)?,
        license_number: row.get(2)?,
        state_code: row.get(3)?,
        credential_ref: get_opt_string(row, 4)?,
        is_active: get_bool(row, 5)?,
        auto_sync_enabled: get_bool(row, 6)?,
        auto_sync_interval_minutes: get_opt_u32(row, 7)?,
        last_sync_at: get_opt_datetime(row, 8)?,
        last_successful_sync_at: get_opt_datetime(row, 9)?,
        last_sync_error: get_opt_string(row, 10)?,
        created_at: parse_datetime(&row.get::<String>(11)?)?,
        updated_at: parse_datetime(&row.get::<String>(12)?)?,
    })
}

/// Fields required to register a license.
#[derive(Debug, Clone)]
pub struct NewLicense {
    pub site_id: String,
    pub license_number: String,
    pub state_code: String,
    pub credential_ref: Option<String>,
    pub auto_sync_enabled: bool,
    pub auto_sync_interval_minutes: Option<u32>,
}

impl CanopyService {
    /// Register a license. New licenses are active.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::AlreadyExists` if the license number is already
    /// registered.
    pub async fn create_license(&self, new: &NewLicense) -> Result<License, DatabaseError> {
        let now = Utc::now();
        let now_str = fmt_datetime(now);
        let id = self.db().generate_id(PREFIX_LICENSE).await?;
        let interval = new.auto_sync_interval_minutes.map(i64::from);

        let result = self
            .db()
            .execute(
                &format!(
                    "INSERT INTO licenses ({SELECT_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, NULL, NULL, NULL, ?8, ?8)"
                ),
                || {
                    libsql::params![
                        id.as_str(),
                        new.site_id.as_str(),
                        new.license_number.as_str(),
                        new.state_code.as_str(),
                        new.credential_ref.as_deref(),
                        i64::from(new.auto_sync_enabled),
                        interval,
                        now_str.as_str()
                    ]
                },
            )
            .await;
        match result {
            Ok(_) => {}
            Err(DatabaseError::LibSql(e)) if e.to_string().contains("UNIQUE constraint failed") => {
                return Err(DatabaseError::AlreadyExists {
                    entity: "license",
                    key: new.license_number.clone(),
                });
            }
            Err(e) => return Err(e),
        }

        tracing::info!(license = %new.license_number, site = %new.site_id, "license registered");
        Ok(License {
            id,
            site_id: new.site_id.clone(),
            license_number: new.license_number.clone(),
            state_code: new.state_code.clone(),
            credential_ref: new.credential_ref.clone(),
            is_active: true,
            auto_sync_enabled: new.auto_sync_enabled,
            auto_sync_interval_minutes: new.auto_sync_interval_minutes,
            last_sync_at: None,
            last_successful_sync_at: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_license(&self, id: &str) -> Result<License, DatabaseError> {
        self.db()
            .fetch_optional(
                &format!("SELECT {SELECT_COLS} FROM licenses WHERE id = ?1"),
                || [id],
                row_to_license,
            )
            .await?
            .ok_or(DatabaseError::NoResult)
    }

    /// Look up a license by its regulator-issued number.
    pub async fn find_license_by_number(
        &self,
        license_number: &str,
    ) -> Result<Option<License>, DatabaseError> {
        self.db()
            .fetch_optional(
                &format!("SELECT {SELECT_COLS} FROM licenses WHERE license_number = ?1"),
                || [license_number],
                row_to_license,
            )
            .await
    }

    pub async fn list_licenses(
        &self,
        site_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<License>, DatabaseError> {
        match site_id {
            Some(site) => {
                self.db()
                    .fetch_all(
                        &format!(
                            "SELECT {SELECT_COLS} FROM licenses WHERE site_id = ?1
                             ORDER BY license_number LIMIT ?2"
                        ),
                        || libsql::params![site, i64::from(limit)],
                        row_to_license,
                    )
                    .await
            }
            None => {
                self.db()
                    .fetch_all(
                        &format!("SELECT {SELECT_COLS} FROM licenses ORDER BY license_number LIMIT ?1"),
                        || libsql::params![i64::from(limit)],
                        row_to_license,
                    )
                    .await
            }
        }
    }

    /// Active licenses with auto-sync enabled. Whether each is due is decided
    /// by [`License::is_due_for_auto_sync`].
    pub async fn list_auto_sync_licenses(&self) -> Result<Vec<License>, DatabaseError> {
        self.db()
            .fetch_all(
                &format!(
                    "SELECT {SELECT_COLS} FROM licenses
                     WHERE is_active = 1 AND auto_sync_enabled = 1
                     ORDER BY license_number"
                ),
                || (),
                row_to_license,
            )
            .await
    }

    pub async fn update_license(
        &self,
        id: &str,
        update: &LicenseUpdate,
    ) -> Result<License, DatabaseError> {
        let mut sets = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();
        let mut idx = 1usize;

        if let Some(ref state_code) = update.state_code {
            sets.push(format!("state_code = ?{idx}"));
            params.push(state_code.clone().into());
            idx += 1;
        }
        if let Some(ref credential_ref) = update.credential_ref {
            sets.push(format!("credential_ref = ?{idx}"));
            params.push(credential_ref.clone().map_or(libsql::Value::Null, Into::into));
            idx += 1;
        }
        if let Some(is_active) = update.is_active {
            sets.push(format!("is_active = ?{idx}"));
            params.push(i64::from(is_active).into());
            idx += 1;
        }
        if let Some(enabled) = update.auto_sync_enabled {
            sets.push(format!("auto_sync_enabled = ?{idx}"));
            params.push(i64::from(enabled).into());
            idx += 1;
        }
        if let Some(minutes) = update.auto_sync_interval_minutes {
            sets.push(format!("auto_sync_interval_minutes = ?{idx}"));
            params.push(minutes.map_or(libsql::Value::Null, |m| i64::from(m).into()));
            idx += 1;
        }

        if sets.is_empty() {
            return self.get_license(id).await;
        }

        sets.push(format!("updated_at = ?{idx}"));
        params.push(fmt_datetime(Utc::now()).into());
        idx += 1;

        params.push(id.into());
        let sql = format!("UPDATE licenses SET {} WHERE id = ?{idx}", sets.join(", "));
        let changed = self
            .db()
            .execute(&sql, || libsql::params_from_iter(params.clone()))
            .await?;
        if changed == 0 {
            return Err(DatabaseError::NoResult);
        }
        self.get_license(id).await
    }

    /// Record the outcome of a finished sync run on the license.
    ///
    /// `last_sync_at` always moves; `last_successful_sync_at` only on success,
    /// which also clears the last error.
    pub async fn record_license_sync_result(
        &self,
        license_number: &str,
        error: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let at = fmt_datetime(at);
        match error {
            None => {
                self.db()
                    .execute(
                        "UPDATE licenses
                         SET last_sync_at = ?2, last_successful_sync_at = ?2,
                             last_sync_error = NULL, updated_at = ?2
                         WHERE license_number = ?1",
                        || libsql::params![license_number, at.as_str()],
                    )
                    .await?;
            }
            Some(message) => {
                self.db()
                    .execute(
                        "UPDATE licenses
                         SET last_sync_at = ?2, last_sync_error = ?3, updated_at = ?2
                         WHERE license_number = ?1",
                        || libsql::params![license_number, at.as_str(), message],
                    )
                    .await?;
            }
        }
        Ok(())
    }
}
