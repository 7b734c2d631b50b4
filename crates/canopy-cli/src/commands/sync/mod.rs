mod cancel;
mod due;
mod items;
mod job;
mod jobs;
mod retry;
mod start;
mod status;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::SyncCommands;
use crate::context::AppContext;

/// Handle `canopy sync`.
pub async fn handle(
    action: &SyncCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        SyncCommands::Start {
            license_number,
            direction,
            force_full,
            initiated_by,
        } => {
            start::run(
                license_number,
                direction,
                *force_full,
                initiated_by.as_deref(),
                ctx,
                flags,
            )
            .await
        }
        SyncCommands::Status { license_number } => status::run(license_number, ctx, flags).await,
        SyncCommands::Job { id } => job::run(id, ctx, flags).await,
        SyncCommands::Jobs {
            site,
            license,
            limit,
        } => jobs::run(site.as_deref(), license.as_deref(), *limit, ctx, flags).await,
        SyncCommands::Cancel { id, reason } => cancel::run(id, reason.as_deref(), ctx, flags).await,
        SyncCommands::Items { id, status, limit } => {
            items::run(id, status.as_deref(), *limit, ctx, flags).await
        }
        SyncCommands::Retry { id } => retry::run(id, ctx, flags).await,
        SyncCommands::Due => due::run(ctx, flags).await,
    }
}
