use crate::cli::GlobalFlags;
use crate::commands::license::require_license;
use crate::context::AppContext;
use crate::output::output;

pub async fn run(license_number: &str, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let license = require_license(ctx, license_number).await?;
    output(&license, flags.format)
}
