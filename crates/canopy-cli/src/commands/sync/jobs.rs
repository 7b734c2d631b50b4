use serde::Serialize;

use canopy_core::entities::SyncJob;

use crate::cli::GlobalFlags;
use crate::commands::shared::limit::effective_limit;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct SyncJobListResponse {
    jobs: Vec<SyncJob>,
}

pub async fn run(
    site: Option<&str>,
    license: Option<&str>,
    limit: Option<u32>,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let limit = effective_limit(limit, flags.limit, ctx.config.general.default_limit);
    let jobs = match (site, license) {
        (_, Some(license)) => {
            ctx.orchestrator
                .get_sync_jobs_for_license(license, limit)
                .await?
        }
        (Some(site), None) => ctx.orchestrator.get_sync_jobs(site, limit).await?,
        (None, None) => anyhow::bail!("one of --site or --license is required"),
    };
    output(&SyncJobListResponse { jobs }, flags.format)
}
