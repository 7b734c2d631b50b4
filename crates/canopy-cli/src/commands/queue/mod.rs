mod release_stale;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::QueueCommands;
use crate::context::AppContext;

/// Handle `canopy queue`.
pub async fn handle(
    action: &QueueCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        QueueCommands::ReleaseStale { older_than_secs } => {
            release_stale::run(*older_than_secs, ctx, flags).await
        }
    }
}
