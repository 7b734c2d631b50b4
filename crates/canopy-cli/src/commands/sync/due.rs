use chrono::Utc;
use serde::Serialize;

use canopy_core::responses::StartSyncResponse;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct DueSyncResponse {
    started: usize,
    responses: Vec<StartSyncResponse>,
}

pub async fn run(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let responses = ctx.orchestrator.start_due_syncs(Utc::now()).await?;
    let started = responses.iter().filter(|r| r.created).count();
    output(&DueSyncResponse { started, responses }, flags.format)
}
