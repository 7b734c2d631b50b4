//! # canopy-config
//!
//! Layered configuration loading for Canopy using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`CANOPY_*` prefix, `__` as separator)
//! 2. Project-level `.canopy/config.toml`
//! 3. User-level `~/.config/canopy/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `CANOPY_RETRY__MAX_RETRIES` -> `retry.max_retries`,
//! `CANOPY_DATABASE__PATH` -> `database.path`, etc.
//! The `__` (double underscore) separates nested config sections.
//!
//! # Usage
//!
//! ```no_run
//! use canopy_config::CanopyConfig;
//!
//! let config = CanopyConfig::load_with_dotenv().expect("config");
//! println!("batch size: {}", config.sync.batch_size);
//! ```

mod database;
mod error;
mod general;
mod reconciliation;
mod retry;
mod sync;

pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use general::GeneralConfig;
pub use reconciliation::ReconciliationConfig;
pub use retry::RetryConfig;
pub use sync::SyncConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const ENV_PREFIX: &str = "CANOPY_";
const PROJECT_CONFIG: &str = ".canopy/config.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CanopyConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

impl CanopyConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] if you need
    /// `.env` file loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if extraction fails or a value is out of range.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// This is public so tests can inspect the figment directly or add
    /// additional providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(user) = Self::global_config_path()
            && user.exists()
        {
            figment = figment.merge(Toml::file(user));
        }
        let project = PathBuf::from(PROJECT_CONFIG);
        if project.exists() {
            figment = figment.merge(Toml::file(project));
        }

        // Environment wins over both files.
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.batch_size == 0 {
            return Err(invalid("sync.batch_size", "must be at least 1"));
        }
        if self.sync.worker_concurrency == 0 {
            return Err(invalid("sync.worker_concurrency", "must be at least 1"));
        }
        if self.sync.entity_types.is_empty() {
            return Err(invalid("sync.entity_types", "must list at least one entity type"));
        }
        if self.retry.max_retries == 0 {
            return Err(invalid("retry.max_retries", "must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        if self.database.path.trim().is_empty() {
            return Err(invalid("database.path", "must not be blank"));
        }
        Ok(())
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("canopy").join("config.toml"))
    }

    /// Load the nearest `.env`, searching the current directory and its
    /// ancestors. Missing files are ignored.
    fn load_dotenv_from_workspace() {
        let Ok(cwd) = std::env::current_dir() else {
            return;
        };
        if let Some(env_file) = cwd
            .ancestors()
            .map(|dir| dir.join(".env"))
            .find(|candidate| candidate.is_file())
        {
            let _ = dotenvy::from_path(&env_file);
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}
