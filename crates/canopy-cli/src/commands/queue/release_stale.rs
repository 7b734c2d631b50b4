use std::time::Duration;

use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct ReleaseStaleResponse {
    released: usize,
    item_ids: Vec<String>,
}

pub async fn run(
    older_than_secs: Option<u64>,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let older_than = older_than_secs
        .map_or_else(|| ctx.config.sync.claim_timeout(), Duration::from_secs);
    let released = ctx
        .orchestrator
        .queue()
        .release_stale_claims(older_than)
        .await?;
    let item_ids: Vec<String> = released.into_iter().map(|item| item.id).collect();
    output(
        &ReleaseStaleResponse {
            released: item_ids.len(),
            item_ids,
        },
        flags.format,
    )
}
