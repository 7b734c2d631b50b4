use serde::Serialize;

use canopy_core::entities::QueueItem;
use canopy_core::enums::QueueItemStatus;

use crate::cli::GlobalFlags;
use crate::commands::shared::limit::effective_limit;
use crate::commands::shared::parse::parse_enum;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct QueueItemListResponse {
    job_id: String,
    items: Vec<QueueItem>,
}

pub async fn run(
    id: &str,
    status: Option<&str>,
    limit: Option<u32>,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let status = status
        .map(|value| parse_enum::<QueueItemStatus>(value, "status"))
        .transpose()?;
    let limit = effective_limit(limit, flags.limit, ctx.config.general.default_limit);
    let items = ctx.orchestrator.get_queue_items(id, status, limit).await?;
    output(
        &QueueItemListResponse {
            job_id: id.to_string(),
            items,
        },
        flags.format,
    )
}
