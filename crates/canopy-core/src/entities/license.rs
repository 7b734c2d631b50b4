use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// A regulator license held by a cultivation site.
///
/// One license per (site, license number). Credentials live in an external
/// secret store; only the reference is kept here.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct License {
    pub id: String,
    pub site_id: String,
    pub license_number: String,
    /// Jurisdiction code, e.g. `"CA"`.
    pub state_code: String,
    pub credential_ref: Option<String>,
    pub is_active: bool,
    pub auto_sync_enabled: bool,
    pub auto_sync_interval_minutes: Option<u32>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl License {
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credential_ref
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }

    /// Inactive licenses and licenses without credentials cannot start a run.
    ///
    /// # Errors
    ///
    /// `CoreError::NotSyncable` naming the first unmet condition.
    pub fn ensure_syncable(&self) -> Result<(), CoreError> {
        let reason = if !self.is_active {
            "license is inactive"
        } else if !self.has_credentials() {
            "no regulator credentials"
        } else {
            return Ok(());
        };
        Err(CoreError::NotSyncable {
            entity: "license",
            id: self.license_number.clone(),
            reason: reason.to_string(),
        })
    }

    /// Whether an auto-sync run is due at `now`. Never-synced licenses are due
    /// immediately.
    #[must_use]
    pub fn is_due_for_auto_sync(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active || !self.auto_sync_enabled {
            return false;
        }
        let Some(interval) = self.auto_sync_interval_minutes.filter(|m| *m > 0) else {
            return false;
        };
        self.last_sync_at
            .is_none_or(|last| last + Duration::minutes(i64::from(interval)) <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn license() -> License {
        let now = Utc::now();
        License {
            id: "lic-000000000001".into(),
            site_id: "site-1".into(),
            license_number: "CA-0001".into(),
            state_code: "CA".into(),
            credential_ref: Some("vault://metrc/ca-0001".into()),
            is_active: true,
            auto_sync_enabled: true,
            auto_sync_interval_minutes: Some(30),
            last_sync_at: None,
            last_successful_sync_at: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn blank_credential_ref_is_missing() {
        let mut lic = license();
        assert!(lic.has_credentials());
        lic.credential_ref = Some("   ".into());
        assert!(!lic.has_credentials());
        lic.credential_ref = None;
        assert!(!lic.has_credentials());
    }

    #[test]
    fn inactive_license_is_not_syncable() {
        let mut lic = license();
        assert_eq!(lic.ensure_syncable(), Ok(()));
        lic.is_active = false;
        let err = lic.ensure_syncable().unwrap_err();
        assert_eq!(err.to_string(), "license CA-0001 cannot be synced: license is inactive");
    }

    #[test]
    fn license_without_credentials_is_not_syncable() {
        let mut lic = license();
        lic.credential_ref = None;
        assert!(matches!(
            lic.ensure_syncable(),
            Err(CoreError::NotSyncable { ref reason, .. }) if reason == "no regulator credentials"
        ));
    }

    #[test]
    fn never_synced_license_is_due() {
        assert!(license().is_due_for_auto_sync(Utc::now()));
    }

    #[test]
    fn due_after_interval_elapses() {
        let now = Utc::now();
        let mut lic = license();
        lic.last_sync_at = Some(now - Duration::minutes(10));
        assert!(!lic.is_due_for_auto_sync(now));
        lic.last_sync_at = Some(now - Duration::minutes(30));
        assert!(lic.is_due_for_auto_sync(now));
    }

    #[test]
    fn inactive_or_disabled_is_never_due() {
        let now = Utc::now();
        let mut lic = license();
        lic.auto_sync_enabled = false;
        assert!(!lic.is_due_for_auto_sync(now));
        lic.auto_sync_enabled = true;
        lic.is_active = false;
        assert!(!lic.is_due_for_auto_sync(now));
    }
}
