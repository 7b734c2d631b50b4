use serde::Serialize;

use canopy_core::entities::SyncCheckpoint;

use crate::cli::GlobalFlags;
use crate::commands::license::require_license;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct CheckpointListResponse {
    license_number: String,
    checkpoints: Vec<SyncCheckpoint>,
}

pub async fn run(license_number: &str, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    require_license(ctx, license_number).await?;
    let checkpoints = ctx.orchestrator.checkpoints().list(license_number).await?;
    output(
        &CheckpointListResponse {
            license_number: license_number.to_string(),
            checkpoints,
        },
        flags.format,
    )
}
