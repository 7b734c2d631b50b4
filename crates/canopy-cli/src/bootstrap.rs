use canopy_config::CanopyConfig;

use crate::cli::GlobalFlags;

/// Load the nearest `.env`, then the layered config. `--database` overrides
/// `database.path` and the result is validated again.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<CanopyConfig> {
    let mut config = CanopyConfig::load_with_dotenv()?;
    if let Some(path) = &flags.database {
        config.database.path.clone_from(path);
        config.validate()?;
    }
    Ok(config)
}
