use crate::cli::GlobalFlags;
use crate::cli::root_commands::Commands;
use crate::commands;
use crate::context::AppContext;

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(
    command: Commands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match command {
        Commands::License { action } => commands::license::handle(&action, ctx, flags).await,
        Commands::Sync { action } => commands::sync::handle(&action, ctx, flags).await,
        Commands::Queue { action } => commands::queue::handle(&action, ctx, flags).await,
        Commands::Checkpoint { action } => commands::checkpoint::handle(&action, ctx, flags).await,
    }
}
