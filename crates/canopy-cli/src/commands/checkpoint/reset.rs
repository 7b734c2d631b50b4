use serde::Serialize;

use canopy_core::enums::EntityType;

use crate::cli::GlobalFlags;
use crate::commands::license::require_license;
use crate::commands::shared::parse::parse_enum;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct CheckpointResetResponse {
    license_number: String,
    entity_type: Option<EntityType>,
    removed: u32,
}

pub async fn run(
    license_number: &str,
    entity_type: Option<&str>,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let entity_type = entity_type
        .map(|value| parse_enum::<EntityType>(value, "entity type"))
        .transpose()?;
    require_license(ctx, license_number).await?;
    let removed = ctx
        .orchestrator
        .checkpoints()
        .reset(license_number, entity_type)
        .await?;
    output(
        &CheckpointResetResponse {
            license_number: license_number.to_string(),
            entity_type,
            removed,
        },
        flags.format,
    )
}
