//! Errors raised while loading or validating [`crate::CanopyConfig`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the config shape.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    /// A value the sync engine cannot run with.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
