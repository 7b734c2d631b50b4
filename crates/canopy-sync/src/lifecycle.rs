//! Job completion shared by the queue manager and the orchestrator.

use chrono::Utc;
use tracing::info;

use canopy_core::entities::SyncJob;
use canopy_db::service::CanopyService;

use crate::error::SyncError;

/// Complete the job if it is sealed and has no in-flight items left, and
/// record the run on its license. Returns the job when this call completed it.
pub(crate) async fn complete_if_drained(
    service: &CanopyService,
    job_id: &str,
) -> Result<Option<SyncJob>, SyncError> {
    let now = Utc::now();
    let Some(job) = service.try_complete_sync_job(job_id, now).await? else {
        return Ok(None);
    };
    service
        .record_license_sync_result(&job.license_number, None, now)
        .await?;
    info!(
        job_id = %job.id,
        license = %job.license_number,
        total = job.counts.total,
        successful = job.counts.successful,
        failed = job.counts.failed,
        "sync job completed"
    );
    Ok(Some(job))
}
