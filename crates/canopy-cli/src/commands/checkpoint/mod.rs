mod list;
mod reset;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::CheckpointCommands;
use crate::context::AppContext;

/// Handle `canopy checkpoint`.
pub async fn handle(
    action: &CheckpointCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        CheckpointCommands::List { license_number } => list::run(license_number, ctx, flags).await,
        CheckpointCommands::Reset {
            license_number,
            entity_type,
        } => reset::run(license_number, entity_type.as_deref(), ctx, flags).await,
    }
}
