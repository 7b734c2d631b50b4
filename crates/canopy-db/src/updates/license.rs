//! License update builder.

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LicenseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_sync_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_sync_interval_minutes: Option<Option<u32>>,
}

impl LicenseUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.state_code.is_none()
            && self.credential_ref.is_none()
            && self.is_active.is_none()
            && self.auto_sync_enabled.is_none()
            && self.auto_sync_interval_minutes.is_none()
    }
}

#[derive(Default)]
pub struct LicenseUpdateBuilder(LicenseUpdate);

impl LicenseUpdateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self(LicenseUpdate::default())
    }

    #[must_use]
    pub fn state_code(mut self, state_code: impl Into<String>) -> Self {
        self.0.state_code = Some(state_code.into());
        self
    }

    #[must_use]
    pub fn credential_ref(mut self, credential_ref: Option<String>) -> Self {
        self.0.credential_ref = Some(credential_ref);
        self
    }

    #[must_use]
    pub fn is_active(mut self, is_active: bool) -> Self {
        self.0.is_active = Some(is_active);
        self
    }

    #[must_use]
    pub fn auto_sync_enabled(mut self, enabled: bool) -> Self {
        self.0.auto_sync_enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn auto_sync_interval_minutes(mut self, minutes: Option<u32>) -> Self {
        self.0.auto_sync_interval_minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn build(self) -> LicenseUpdate {
        self.0
    }
}
