mod add;
mod get;
mod list;
mod update;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::LicenseCommands;
use crate::context::AppContext;

/// Handle `canopy license`.
pub async fn handle(
    action: &LicenseCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        LicenseCommands::Add {
            license_number,
            site,
            state,
            credential_ref,
            auto_sync,
            interval_minutes,
        } => {
            add::run(
                add::AddArgs {
                    license_number,
                    site,
                    state,
                    credential_ref: credential_ref.as_deref(),
                    auto_sync: *auto_sync,
                    interval_minutes: *interval_minutes,
                },
                ctx,
                flags,
            )
            .await
        }
        LicenseCommands::Get { license_number } => get::run(license_number, ctx, flags).await,
        LicenseCommands::List { site, limit } => {
            list::run(site.as_deref(), *limit, ctx, flags).await
        }
        LicenseCommands::Update {
            license_number,
            state,
            credential_ref,
            clear_credentials,
            active,
            auto_sync,
            interval_minutes,
        } => {
            update::run(
                license_number,
                update::UpdateArgs {
                    state: state.as_deref(),
                    credential_ref: credential_ref.as_deref(),
                    clear_credentials: *clear_credentials,
                    active: *active,
                    auto_sync: *auto_sync,
                    interval_minutes: *interval_minutes,
                },
                ctx,
                flags,
            )
            .await
        }
    }
}

/// Look a license up by number, failing with a readable error.
pub async fn require_license(
    ctx: &AppContext,
    license_number: &str,
) -> anyhow::Result<canopy_core::entities::License> {
    ctx.service
        .find_license_by_number(license_number)
        .await?
        .ok_or_else(|| anyhow::anyhow!("license '{license_number}' is not registered"))
}
