use canopy_core::enums::SyncDirection;
use canopy_sync::StartSyncRequest;

use crate::cli::GlobalFlags;
use crate::commands::shared::parse::parse_enum;
use crate::context::AppContext;
use crate::output::output;

const CLI_INITIATOR: &str = "cli";

pub async fn run(
    license_number: &str,
    direction: &str,
    force_full: bool,
    initiated_by: Option<&str>,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let direction = parse_enum::<SyncDirection>(direction, "direction")?;
    let request = StartSyncRequest::new(license_number, direction)
        .force_full_sync(force_full)
        .initiated_by(initiated_by.unwrap_or(CLI_INITIATOR));

    let response = ctx.orchestrator.start_sync(request).await?;
    if !flags.quiet {
        eprintln!("{}", response.message);
        if response.created {
            eprintln!("job {} will run when a sync host resumes active jobs", response.job.id);
        }
    }
    output(&response, flags.format)
}
