use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

pub async fn run(
    id: &str,
    reason: Option<&str>,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let response = ctx.orchestrator.cancel_sync_job(id, reason).await?;
    if !response.cancelled && !flags.quiet {
        eprintln!("sync job {id} is not running; nothing to cancel");
    }
    output(&response, flags.format)
}
