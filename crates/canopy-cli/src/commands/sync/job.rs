use serde::Serialize;

use canopy_core::entities::SyncJob;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct SyncJobDetailResponse {
    job: SyncJob,
    progress_percentage: f64,
    duration_ms: Option<i64>,
}

pub async fn run(id: &str, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let job = ctx.orchestrator.get_sync_job(id).await?;
    let progress_percentage = job.progress_percentage();
    let duration_ms = job.duration().map(|d| d.num_milliseconds());
    output(
        &SyncJobDetailResponse {
            job,
            progress_percentage,
            duration_ms,
        },
        flags.format,
    )
}
