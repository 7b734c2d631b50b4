use canopy_db::repos::license::NewLicense;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

pub struct AddArgs<'a> {
    pub license_number: &'a str,
    pub site: &'a str,
    pub state: &'a str,
    pub credential_ref: Option<&'a str>,
    pub auto_sync: bool,
    pub interval_minutes: Option<u32>,
}

pub async fn run(args: AddArgs<'_>, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    if args.auto_sync && args.interval_minutes.is_none() {
        anyhow::bail!("--auto-sync requires --interval-minutes");
    }

    let license = ctx
        .service
        .create_license(&NewLicense {
            site_id: args.site.to_string(),
            license_number: args.license_number.to_string(),
            state_code: args.state.to_uppercase(),
            credential_ref: args.credential_ref.map(str::to_string),
            auto_sync_enabled: args.auto_sync,
            auto_sync_interval_minutes: args.interval_minutes,
        })
        .await?;
    output(&license, flags.format)
}
