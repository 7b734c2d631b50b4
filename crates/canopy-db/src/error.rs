//! Database error types for canopy-db.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a row but none matched.
    #[error("No result returned")]
    NoResult,

    /// A unique key is already taken.
    #[error("{entity} {key} already exists")]
    AlreadyExists { entity: &'static str, key: String },

    /// A stored value that does not map back onto its domain type.
    #[error("Corrupt column value: {0}")]
    Corrupt(String),

    /// A conditional write kept losing to concurrent writers.
    #[error("Write contention: {0}")]
    Contention(String),

    #[error("Payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}
