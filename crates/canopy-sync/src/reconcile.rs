//! Reconciliation engine: read-only drift detection between local records
//! and the regulator.
//!
//! Records are matched by regulator label, falling back to the remote id.
//! Matched records are compared field by field over the union of their field
//! names; a field missing on one side compares as `null`. A key seen twice on
//! one side matches once; each further record under it counts as one-sided.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use canopy_config::ReconciliationConfig;
use canopy_core::enums::EntityType;
use canopy_db::service::CanopyService;

use crate::collaborators::{AdapterRegistry, ComplianceRecord, LocalRecordSource};
use crate::error::SyncError;

/// One difference between the two systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    LocalOnly {
        key: String,
    },
    RemoteOnly {
        key: String,
    },
    FieldMismatch {
        key: String,
        field: String,
        local_value: Value,
        remote_value: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReconciliation {
    pub entity_type: EntityType,
    pub local_count: u32,
    pub remote_count: u32,
    pub matched_count: u32,
    pub local_only_count: u32,
    pub remote_only_count: u32,
    /// Field-level mismatches among matched records.
    pub discrepancy_count: u32,
    /// Present when details were requested; capped per entity type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discrepancies: Option<Vec<Discrepancy>>,
}

impl EntityReconciliation {
    #[must_use]
    pub const fn is_in_sync(&self) -> bool {
        self.local_only_count == 0 && self.remote_only_count == 0 && self.discrepancy_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub license_number: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub entity_results: Vec<EntityReconciliation>,
    pub is_in_sync: bool,
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    service: Arc<CanopyService>,
    adapters: Arc<AdapterRegistry>,
    local: Arc<dyn LocalRecordSource>,
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    pub fn new(
        service: Arc<CanopyService>,
        adapters: Arc<AdapterRegistry>,
        local: Arc<dyn LocalRecordSource>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            service,
            adapters,
            local,
            config,
        }
    }

    /// Compare local and remote records for each entity type.
    ///
    /// # Errors
    ///
    /// `Validation` for an unknown license, an empty entity type list, or an
    /// entity type without an adapter. Fetch failures on either side are
    /// returned directly.
    pub async fn reconcile(
        &self,
        license_number: &str,
        entity_types: &[EntityType],
        include_details: bool,
    ) -> Result<ReconciliationReport, SyncError> {
        if self
            .service
            .find_license_by_number(license_number)
            .await?
            .is_none()
        {
            return Err(SyncError::Validation(format!("unknown license {license_number}")));
        }
        if entity_types.is_empty() {
            return Err(SyncError::Validation(
                "at least one entity type is required".to_string(),
            ));
        }

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut entity_results = Vec::with_capacity(entity_types.len());
        for &entity_type in entity_types {
            let adapter = self.adapters.get(entity_type).ok_or_else(|| {
                SyncError::Validation(format!("no regulator adapter for {entity_type}"))
            })?;
            let remote = adapter.get_active(license_number).await?;
            let local = self.local.local_records(license_number, entity_type).await?;
            entity_results.push(compare_records(
                entity_type,
                &local,
                &remote,
                &self.config,
                include_details,
            ));
        }

        let report = ReconciliationReport {
            license_number: license_number.to_string(),
            started_at,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            is_in_sync: entity_results.iter().all(EntityReconciliation::is_in_sync),
            entity_results,
        };
        info!(
            license = license_number,
            entity_types = entity_types.len(),
            in_sync = report.is_in_sync,
            duration_ms = report.duration_ms,
            "reconciliation finished"
        );
        Ok(report)
    }
}

/// Compare one entity type's record sets.
pub fn compare_records(
    entity_type: EntityType,
    local: &[ComplianceRecord],
    remote: &[ComplianceRecord],
    config: &ReconciliationConfig,
    include_details: bool,
) -> EntityReconciliation {
    let (local_by_key, local_extra) = key_records(local, "local");
    let (remote_by_key, remote_extra) = key_records(remote, "remote");
    let cap = usize::try_from(config.max_discrepancies_per_type).unwrap_or(usize::MAX);
    let mut details = Vec::new();
    let mut push = |d: Discrepancy| {
        if include_details && details.len() < cap {
            details.push(d);
        }
    };

    let mut matched = 0u32;
    let mut local_only = 0u32;
    let mut mismatches = 0u32;
    for (key, local_record) in &local_by_key {
        let Some(remote_record) = remote_by_key.get(key) else {
            local_only += 1;
            push(Discrepancy::LocalOnly { key: key.clone() });
            continue;
        };
        matched += 1;
        for field in field_union(local_record, remote_record) {
            if config.ignored_fields.iter().any(|f| f == field) {
                continue;
            }
            let l = local_record.fields.get(field).unwrap_or(&Value::Null);
            let r = remote_record.fields.get(field).unwrap_or(&Value::Null);
            if !values_equal(l, r, config.ignore_case) {
                mismatches += 1;
                push(Discrepancy::FieldMismatch {
                    key: key.clone(),
                    field: field.to_string(),
                    local_value: l.clone(),
                    remote_value: r.clone(),
                });
            }
        }
    }

    let mut remote_only = 0u32;
    for key in remote_by_key.keys() {
        if !local_by_key.contains_key(key) {
            remote_only += 1;
            push(Discrepancy::RemoteOnly { key: key.clone() });
        }
    }

    for key in local_extra {
        local_only += 1;
        push(Discrepancy::LocalOnly { key });
    }
    for key in remote_extra {
        remote_only += 1;
        push(Discrepancy::RemoteOnly { key });
    }

    EntityReconciliation {
        entity_type,
        local_count: count(local.len()),
        remote_count: count(remote.len()),
        matched_count: matched,
        local_only_count: local_only,
        remote_only_count: remote_only,
        discrepancy_count: mismatches,
        discrepancies: include_details.then_some(details),
    }
}

/// Index records by match key, returning the keys of records that repeat an
/// earlier key. Records with no label or remote id fall back to their local
/// id, then to a position key tagged with `side` so the two sides never share
/// one.
fn key_records<'a>(
    records: &'a [ComplianceRecord],
    side: &str,
) -> (BTreeMap<String, &'a ComplianceRecord>, Vec<String>) {
    let mut by_key = BTreeMap::new();
    let mut repeated = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let key = record
            .match_key()
            .or(record.local_id.as_deref())
            .map_or_else(|| format!("{side}#{i}"), str::to_string);
        if by_key.contains_key(&key) {
            repeated.push(key);
        } else {
            by_key.insert(key, record);
        }
    }
    (by_key, repeated)
}

fn field_union<'a>(a: &'a ComplianceRecord, b: &'a ComplianceRecord) -> BTreeSet<&'a str> {
    a.fields
        .keys()
        .chain(b.fields.keys())
        .map(String::as_str)
        .collect()
}

fn values_equal(a: &Value, b: &Value, ignore_case: bool) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) if ignore_case => x.to_lowercase() == y.to_lowercase(),
        _ => a == b,
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
