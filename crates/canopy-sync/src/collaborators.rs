//! Seams to the systems this engine talks to but does not implement:
//! per-module regulator API adapters, entity mapping, and the local stores.
//!
//! Wire protocols, DTO translation, and credential handling live behind these
//! traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use canopy_core::entities::QueueItem;
use canopy_core::enums::{EntityType, OperationType};

use crate::error::ApiFailure;

/// One record as seen by either system, flattened to named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    /// Local primary key, when the record exists locally.
    pub local_id: Option<String>,
    pub remote_id: Option<String>,
    /// Regulator tag or label, e.g. a package tag.
    pub label: Option<String>,
    pub fields: Map<String, Value>,
}

impl ComplianceRecord {
    /// Matching key across systems: the label, falling back to the remote id.
    #[must_use]
    pub fn match_key(&self) -> Option<&str> {
        self.label.as_deref().or(self.remote_id.as_deref())
    }
}

/// Result of one regulator mutation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub error_message: Option<String>,
    pub status_code: Option<u16>,
    pub rate_limited: bool,
    pub remote_id: Option<String>,
    pub remote_label: Option<String>,
    pub raw: Option<String>,
}

impl ApiResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            status_code: Some(200),
            ..Self::default()
        }
    }

    /// Classify an unsuccessful response. `None` for success.
    ///
    /// Throttling (flag or 429) is `RateLimited`; other 4xx except 408 are
    /// `Permanent`; everything else, including a missing status, is
    /// `Transient`.
    #[must_use]
    pub fn failure(&self) -> Option<ApiFailure> {
        if self.success {
            return None;
        }
        let message = self
            .error_message
            .clone()
            .unwrap_or_else(|| "regulator call failed".to_string());
        let failure = match self.status_code {
            _ if self.rate_limited => ApiFailure::rate_limited(message),
            Some(429) => ApiFailure::rate_limited(message),
            Some(408) => ApiFailure::transient(message),
            Some(400..=499) => ApiFailure::permanent(message),
            _ => ApiFailure::transient(message),
        };
        let failure = match self.status_code {
            Some(status) => failure.with_code(status.to_string()),
            None => failure,
        };
        Some(failure.with_raw(self.raw.clone()))
    }
}

/// Local-side effect of applying one pulled record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub is_new: bool,
    pub has_changes: bool,
    pub changed_fields: Vec<String>,
}

/// Identifies another change in the same scan that must be delivered first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRef {
    pub entity_type: EntityType,
    pub local_entity_id: String,
    pub operation_type: OperationType,
}

/// A locally-originated mutation to deliver to the regulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundChange {
    pub entity_type: EntityType,
    pub operation_type: OperationType,
    pub local_entity_id: String,
    pub remote_id: Option<String>,
    pub remote_label: Option<String>,
    pub payload: Value,
    /// Lower is sooner.
    pub priority: i32,
    pub depends_on: Option<ChangeRef>,
}

impl OutboundChange {
    /// How other changes in the same scan refer to this one.
    #[must_use]
    pub fn change_ref(&self) -> ChangeRef {
        ChangeRef {
            entity_type: self.entity_type,
            local_entity_id: self.local_entity_id.clone(),
            operation_type: self.operation_type,
        }
    }
}

/// Regulator API module for one entity type.
#[async_trait]
pub trait RegulatorAdapter: Send + Sync {
    fn entity_type(&self) -> EntityType;

    /// Every active record for the license (full pull).
    async fn get_active(&self, license_number: &str) -> Result<Vec<ComplianceRecord>, ApiFailure>;

    /// Records modified since `since` (incremental pull).
    async fn get_changed_since(
        &self,
        license_number: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ComplianceRecord>, ApiFailure>;

    /// Perform one mutation. `Err` is reserved for transport failures where
    /// no response was received.
    async fn execute(
        &self,
        license_number: &str,
        operation: OperationType,
        payload: &Value,
    ) -> Result<ApiResponse, ApiFailure>;
}

/// Translation between local entities and regulator payloads.
#[async_trait]
pub trait EntityMapper: Send + Sync {
    async fn to_regulator_payload(&self, item: &QueueItem) -> anyhow::Result<Value>;

    async fn apply_remote(
        &self,
        license_number: &str,
        entity_type: EntityType,
        record: &ComplianceRecord,
    ) -> anyhow::Result<SyncResult>;
}

/// Authoritative local records, for reconciliation.
#[async_trait]
pub trait LocalRecordSource: Send + Sync {
    async fn local_records(
        &self,
        license_number: &str,
        entity_type: EntityType,
    ) -> anyhow::Result<Vec<ComplianceRecord>>;
}

/// Local mutations awaiting delivery.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Changes made after `since`, or every undelivered change when `None`.
    async fn changes_since(
        &self,
        license_number: &str,
        entity_type: EntityType,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<OutboundChange>>;
}

/// Entity type to adapter lookup.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<EntityType, Arc<dyn RegulatorAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own entity type, replacing any previous one.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn RegulatorAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn RegulatorAdapter>) {
        self.adapters.insert(adapter.entity_type(), adapter);
    }

    #[must_use]
    pub fn get(&self, entity_type: EntityType) -> Option<Arc<dyn RegulatorAdapter>> {
        self.adapters.get(&entity_type).cloned()
    }

    #[must_use]
    pub fn contains(&self, entity_type: EntityType) -> bool {
        self.adapters.contains_key(&entity_type)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.adapters.keys().collect();
        types.sort();
        f.debug_struct("AdapterRegistry")
            .field("entity_types", &types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use canopy_core::enums::FailureKind;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Some(503), false, FailureKind::Transient)]
    #[case(None, false, FailureKind::Transient)]
    #[case(Some(408), false, FailureKind::Transient)]
    #[case(Some(429), false, FailureKind::RateLimited)]
    #[case(Some(200), true, FailureKind::RateLimited)]
    #[case(Some(400), false, FailureKind::Permanent)]
    #[case(Some(422), false, FailureKind::Permanent)]
    fn failure_classification(
        #[case] status: Option<u16>,
        #[case] rate_limited: bool,
        #[case] kind: FailureKind,
    ) {
        let resp = ApiResponse {
            success: false,
            status_code: status,
            rate_limited,
            ..ApiResponse::default()
        };
        assert_eq!(resp.failure().unwrap().kind, kind);
    }

    #[test]
    fn success_has_no_failure() {
        assert!(ApiResponse::ok().failure().is_none());
    }

    #[test]
    fn match_key_prefers_label() {
        let mut record = ComplianceRecord {
            remote_id: Some("998877".into()),
            label: Some("1A4FF01".into()),
            ..ComplianceRecord::default()
        };
        assert_eq!(record.match_key(), Some("1A4FF01"));
        record.label = None;
        assert_eq!(record.match_key(), Some("998877"));
    }
}
