//! In-memory collaborators and an engine harness for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use canopy_config::CanopyConfig;
use canopy_core::entities::{License, QueueItem};
use canopy_core::enums::{EntityType, OperationType};
use canopy_db::repos::license::NewLicense;
use canopy_db::service::CanopyService;
use canopy_sync::{
    AdapterRegistry, ApiFailure, ApiResponse, ChangeRef, ChangeSource, Collaborators,
    ComplianceRecord, EntityMapper, LocalRecordSource, OutboundChange, RegulatorAdapter,
    SyncEngine, SyncResult,
};

// ---------------------------------------------------------------------------
// Regulator adapter
// ---------------------------------------------------------------------------

pub struct FakeAdapter {
    entity_type: EntityType,
    active: Mutex<Vec<ComplianceRecord>>,
    scripted: Mutex<VecDeque<Result<ApiResponse, ApiFailure>>>,
    pull_failure: Mutex<Option<ApiFailure>>,
    call_delay: Mutex<Option<Duration>>,
    pub calls: Mutex<Vec<(OperationType, Value)>>,
    /// `since` of every pull; `None` is a full pull.
    pub pulls: Mutex<Vec<Option<DateTime<Utc>>>>,
    next_remote_id: AtomicU32,
}

impl FakeAdapter {
    pub fn new(entity_type: EntityType) -> Arc<Self> {
        Arc::new(Self {
            entity_type,
            active: Mutex::default(),
            scripted: Mutex::default(),
            pull_failure: Mutex::default(),
            call_delay: Mutex::default(),
            calls: Mutex::default(),
            pulls: Mutex::default(),
            next_remote_id: AtomicU32::new(1),
        })
    }

    pub fn set_active(&self, records: Vec<ComplianceRecord>) {
        *self.active.lock().unwrap() = records;
    }

    /// Responses returned by the next `execute` calls, in order.
    pub fn script(&self, response: Result<ApiResponse, ApiFailure>) {
        self.scripted.lock().unwrap().push_back(response);
    }

    pub fn fail_pulls(&self, failure: Option<ApiFailure>) {
        *self.pull_failure.lock().unwrap() = failure;
    }

    pub fn delay_calls(&self, delay: Duration) {
        *self.call_delay.lock().unwrap() = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn pull_log(&self) -> Vec<Option<DateTime<Utc>>> {
        self.pulls.lock().unwrap().clone()
    }

    fn pull(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ComplianceRecord>, ApiFailure> {
        self.pulls.lock().unwrap().push(since);
        if let Some(failure) = self.pull_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(self.active.lock().unwrap().clone())
    }
}

#[async_trait]
impl RegulatorAdapter for FakeAdapter {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    async fn get_active(&self, _license_number: &str) -> Result<Vec<ComplianceRecord>, ApiFailure> {
        self.pull(None)
    }

    async fn get_changed_since(
        &self,
        _license_number: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ComplianceRecord>, ApiFailure> {
        self.pull(Some(since))
    }

    async fn execute(
        &self,
        _license_number: &str,
        operation: OperationType,
        payload: &Value,
    ) -> Result<ApiResponse, ApiFailure> {
        self.calls.lock().unwrap().push((operation, payload.clone()));
        let delay = *self.call_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.scripted.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.next_remote_id.fetch_add(1, Ordering::SeqCst);
            Ok(ApiResponse {
                remote_id: Some(format!("R{n}")),
                raw: Some(json!({"Id": n}).to_string()),
                ..ApiResponse::ok()
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Mapper, change source, local records
// ---------------------------------------------------------------------------

/// Passes payloads through; a payload with `"unmappable": true` fails.
#[derive(Default)]
pub struct FakeMapper {
    pub applied: Mutex<Vec<(EntityType, ComplianceRecord)>>,
}

#[async_trait]
impl EntityMapper for FakeMapper {
    async fn to_regulator_payload(&self, item: &QueueItem) -> anyhow::Result<Value> {
        if item.payload.get("unmappable") == Some(&Value::Bool(true)) {
            anyhow::bail!("missing required field Location");
        }
        Ok(item.payload.clone())
    }

    async fn apply_remote(
        &self,
        _license_number: &str,
        entity_type: EntityType,
        record: &ComplianceRecord,
    ) -> anyhow::Result<SyncResult> {
        let mut applied = self.applied.lock().unwrap();
        let is_new = !applied
            .iter()
            .any(|(et, r)| *et == entity_type && r.match_key() == record.match_key());
        applied.push((entity_type, record.clone()));
        Ok(SyncResult {
            is_new,
            has_changes: true,
            changed_fields: record.fields.keys().cloned().collect(),
        })
    }
}

#[derive(Default)]
pub struct FakeChanges {
    changes: Mutex<HashMap<EntityType, Vec<OutboundChange>>>,
    pub scans: Mutex<Vec<(EntityType, Option<DateTime<Utc>>)>>,
}

impl FakeChanges {
    pub fn add(&self, change: OutboundChange) {
        self.changes
            .lock()
            .unwrap()
            .entry(change.entity_type)
            .or_default()
            .push(change);
    }
}

#[async_trait]
impl ChangeSource for FakeChanges {
    async fn changes_since(
        &self,
        _license_number: &str,
        entity_type: EntityType,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<OutboundChange>> {
        self.scans.lock().unwrap().push((entity_type, since));
        // Changes are handed out once.
        Ok(self
            .changes
            .lock()
            .unwrap()
            .remove(&entity_type)
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeLocal {
    records: Mutex<HashMap<EntityType, Vec<ComplianceRecord>>>,
}

impl FakeLocal {
    pub fn set(&self, entity_type: EntityType, records: Vec<ComplianceRecord>) {
        self.records.lock().unwrap().insert(entity_type, records);
    }
}

#[async_trait]
impl LocalRecordSource for FakeLocal {
    async fn local_records(
        &self,
        _license_number: &str,
        entity_type: EntityType,
    ) -> anyhow::Result<Vec<ComplianceRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&entity_type)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn package(label: &str, fields: Value) -> ComplianceRecord {
    ComplianceRecord {
        local_id: None,
        remote_id: None,
        label: Some(label.into()),
        fields: fields.as_object().cloned().unwrap_or_default(),
    }
}

pub fn change(entity_type: EntityType, local_id: &str, op: OperationType) -> OutboundChange {
    OutboundChange {
        entity_type,
        operation_type: op,
        local_entity_id: local_id.into(),
        remote_id: None,
        remote_label: None,
        payload: json!({"Id": local_id}),
        priority: 100,
        depends_on: None,
    }
}

pub fn after(
    mut change: OutboundChange,
    entity_type: EntityType,
    local_id: &str,
    op: OperationType,
) -> OutboundChange {
    change.depends_on = Some(ChangeRef {
        entity_type,
        local_entity_id: local_id.into(),
        operation_type: op,
    });
    change
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: Arc<CanopyService>,
    pub engine: SyncEngine,
    pub packages: Arc<FakeAdapter>,
    pub plants: Arc<FakeAdapter>,
    pub mapper: Arc<FakeMapper>,
    pub changes: Arc<FakeChanges>,
    pub local: Arc<FakeLocal>,
}

/// Config with immediate retries and fast polling. Only packages and plants
/// are synced.
pub fn test_config() -> CanopyConfig {
    let mut config = CanopyConfig::default();
    config.sync.entity_types = vec![EntityType::Plant, EntityType::Package];
    config.sync.poll_interval_ms = 10;
    config.sync.request_timeout_secs = 5;
    config.retry.base_delay_ms = 0;
    config.retry.max_delay_ms = 0;
    config.retry.rate_limit_delay_ms = 0;
    config
}

pub async fn harness() -> Harness {
    harness_with(test_config()).await
}

pub async fn harness_with(config: CanopyConfig) -> Harness {
    let service = Arc::new(CanopyService::new_local(":memory:").await.unwrap());
    let packages = FakeAdapter::new(EntityType::Package);
    let plants = FakeAdapter::new(EntityType::Plant);
    let mapper = Arc::new(FakeMapper::default());
    let changes = Arc::new(FakeChanges::default());
    let local = Arc::new(FakeLocal::default());

    let adapters = AdapterRegistry::new()
        .with(packages.clone())
        .with(plants.clone());
    let engine = SyncEngine::new(
        Arc::clone(&service),
        &config,
        Collaborators {
            adapters,
            mapper: mapper.clone(),
            changes: changes.clone(),
            local_records: local.clone(),
        },
    );
    Harness {
        service,
        engine,
        packages,
        plants,
        mapper,
        changes,
        local,
    }
}

impl Harness {
    pub async fn license(&self, number: &str) -> License {
        self.service
            .create_license(&NewLicense {
                site_id: "site-oakland".into(),
                license_number: number.into(),
                state_code: "CA".into(),
                credential_ref: Some(format!("vault://metrc/{number}")),
                auto_sync_enabled: false,
                auto_sync_interval_minutes: None,
            })
            .await
            .unwrap()
    }
}
