use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

pub async fn run(license_number: &str, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let status = ctx.orchestrator.get_sync_status(license_number).await?;
    output(&status, flags.format)
}
