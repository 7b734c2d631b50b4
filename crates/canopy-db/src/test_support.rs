//! Shared test utilities for canopy-db unit tests.

pub(crate) mod helpers {
    use canopy_core::entities::{License, SyncJob};
    use canopy_core::enums::SyncDirection;

    use crate::CanopyDb;
    use crate::repos::license::NewLicense;
    use crate::repos::sync_job::NewSyncJob;
    use crate::service::CanopyService;

    /// Create an in-memory `CanopyService`.
    pub async fn test_service() -> CanopyService {
        let db = CanopyDb::open_local(":memory:").await.unwrap();
        CanopyService::from_db(db)
    }

    /// Register an active license with credentials.
    pub async fn seed_license(svc: &CanopyService, number: &str) -> License {
        svc.create_license(&NewLicense {
            site_id: "site-1".into(),
            license_number: number.into(),
            state_code: "CA".into(),
            credential_ref: Some(format!("vault://metrc/{number}")),
            auto_sync_enabled: false,
            auto_sync_interval_minutes: None,
        })
        .await
        .unwrap()
    }

    /// Start a running job for the license, returning it.
    pub async fn start_job(svc: &CanopyService, license: &License) -> SyncJob {
        let (job, created) = svc
            .insert_sync_job_if_idle(&NewSyncJob::running(license, SyncDirection::Push))
            .await
            .unwrap();
        assert!(created);
        job
    }
}
