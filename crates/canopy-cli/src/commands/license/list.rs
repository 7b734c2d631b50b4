use serde::Serialize;

use canopy_core::entities::License;

use crate::cli::GlobalFlags;
use crate::commands::shared::limit::effective_limit;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct LicenseListResponse {
    licenses: Vec<License>,
}

pub async fn run(
    site: Option<&str>,
    limit: Option<u32>,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let limit = effective_limit(limit, flags.limit, ctx.config.general.default_limit);
    let licenses = ctx.service.list_licenses(site, limit).await?;
    output(&LicenseListResponse { licenses }, flags.format)
}
