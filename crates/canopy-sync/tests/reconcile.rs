//! Reconciliation against in-memory local and regulator record sets.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;

use canopy_core::enums::EntityType;
use canopy_sync::reconcile::Discrepancy;
use canopy_sync::{ApiFailure, SyncError};

use common::{harness, package};

#[tokio::test]
async fn identical_record_sets_are_in_sync() {
    let h = harness().await;
    h.license("CA-0001").await;
    let records = vec![
        package("1A4F01", json!({"Quantity": 10, "Location": "Vault"})),
        package("1A4F02", json!({"Quantity": 4, "Location": "Floor"})),
    ];
    h.packages.set_active(records.clone());
    h.local.set(EntityType::Package, records);

    let report = h
        .engine
        .reconciler
        .reconcile("CA-0001", &[EntityType::Package], true)
        .await
        .unwrap();
    assert!(report.is_in_sync);
    let result = &report.entity_results[0];
    assert_eq!(result.matched_count, 2);
    assert_eq!(result.discrepancies.as_deref(), Some(&[][..]));
}

#[tokio::test]
async fn drift_is_reported_per_entity_type() {
    let h = harness().await;
    h.license("CA-0001").await;
    h.local.set(
        EntityType::Package,
        vec![
            package("1A4F01", json!({"Quantity": 10})),
            package("1A4F03", json!({"Quantity": 1})),
        ],
    );
    h.packages.set_active(vec![
        package("1A4F01", json!({"Quantity": 8})),
        package("1A4F02", json!({"Quantity": 4})),
    ]);

    let report = h
        .engine
        .reconciler
        .reconcile("CA-0001", &[EntityType::Plant, EntityType::Package], true)
        .await
        .unwrap();
    assert!(!report.is_in_sync);
    assert_eq!(report.entity_results.len(), 2);
    assert!(report.entity_results[0].is_in_sync());

    let packages = &report.entity_results[1];
    assert_eq!(packages.entity_type, EntityType::Package);
    assert_eq!(packages.local_only_count, 1);
    assert_eq!(packages.remote_only_count, 1);
    assert_eq!(packages.discrepancy_count, 1);
    let details = packages.discrepancies.as_ref().unwrap();
    assert!(details.contains(&Discrepancy::FieldMismatch {
        key: "1A4F01".into(),
        field: "Quantity".into(),
        local_value: json!(10),
        remote_value: json!(8),
    }));
    assert!(details.contains(&Discrepancy::RemoteOnly {
        key: "1A4F02".into()
    }));
    assert!(details.contains(&Discrepancy::LocalOnly {
        key: "1A4F03".into()
    }));
}

#[tokio::test]
async fn details_are_omitted_unless_requested() {
    let h = harness().await;
    h.license("CA-0001").await;
    h.packages
        .set_active(vec![package("1A4F02", json!({"Quantity": 4}))]);

    let report = h
        .engine
        .reconciler
        .reconcile("CA-0001", &[EntityType::Package], false)
        .await
        .unwrap();
    assert_eq!(report.entity_results[0].remote_only_count, 1);
    assert!(report.entity_results[0].discrepancies.is_none());
}

#[tokio::test]
async fn unknown_license_and_missing_adapter_are_rejected() {
    let h = harness().await;
    let err = h
        .engine
        .reconciler
        .reconcile("CA-9999", &[EntityType::Package], false)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    h.license("CA-0001").await;
    let err = h
        .engine
        .reconciler
        .reconcile("CA-0001", &[EntityType::Harvest], false)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    let err = h
        .engine
        .reconciler
        .reconcile("CA-0001", &[], false)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[tokio::test]
async fn regulator_failure_aborts_reconciliation() {
    let h = harness().await;
    h.license("CA-0001").await;
    h.packages
        .fail_pulls(Some(ApiFailure::transient("Service unavailable")));

    let err = h
        .engine
        .reconciler
        .reconcile("CA-0001", &[EntityType::Package], false)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Api(_)));
}
