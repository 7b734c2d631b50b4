use canopy_db::updates::license::{LicenseUpdate, LicenseUpdateBuilder};

use crate::cli::GlobalFlags;
use crate::commands::license::require_license;
use crate::context::AppContext;
use crate::output::output;

pub struct UpdateArgs<'a> {
    pub state: Option<&'a str>,
    pub credential_ref: Option<&'a str>,
    pub clear_credentials: bool,
    pub active: Option<bool>,
    pub auto_sync: Option<bool>,
    pub interval_minutes: Option<u32>,
}

pub async fn run(
    license_number: &str,
    args: UpdateArgs<'_>,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let update = build_update(&args);
    if update.is_empty() {
        anyhow::bail!(
            "At least one of --state, --credential-ref, --clear-credentials, --active, \
             --auto-sync, or --interval-minutes must be provided"
        );
    }

    let license = require_license(ctx, license_number).await?;
    let license = ctx.service.update_license(&license.id, &update).await?;
    output(&license, flags.format)
}

fn build_update(args: &UpdateArgs<'_>) -> LicenseUpdate {
    let mut builder = LicenseUpdateBuilder::new();
    if let Some(state) = args.state {
        builder = builder.state_code(state.to_uppercase());
    }
    if let Some(credential_ref) = args.credential_ref {
        builder = builder.credential_ref(Some(credential_ref.to_string()));
    } else if args.clear_credentials {
        builder = builder.credential_ref(None);
    }
    if let Some(active) = args.active {
        builder = builder.is_active(active);
    }
    if let Some(enabled) = args.auto_sync {
        builder = builder.auto_sync_enabled(enabled);
    }
    if let Some(minutes) = args.interval_minutes {
        builder = builder.auto_sync_interval_minutes(Some(minutes));
    }
    builder.build()
}
