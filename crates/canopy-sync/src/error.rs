//! Error types for the sync engine.

use std::fmt;

use canopy_core::entities::ItemError;
use canopy_core::enums::FailureKind;
use canopy_core::errors::CoreError;
use canopy_db::error::DatabaseError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A classified failure of one regulator call.
///
/// Recorded per queue item; never aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub kind: FailureKind,
    pub message: String,
    pub code: Option<String>,
    /// Raw regulator response body, if any.
    pub raw: Option<String>,
}

impl ApiFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            raw: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Permanent, message)
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_raw(mut self, raw: Option<String>) -> Self {
        self.raw = raw;
        self
    }

    /// The per-item error record. Falls back to the failure kind as the code
    /// so throttling stays distinguishable from data problems.
    #[must_use]
    pub fn to_item_error(&self) -> ItemError {
        ItemError {
            message: self.message.clone(),
            code: Some(
                self.code
                    .clone()
                    .unwrap_or_else(|| self.kind.as_str().to_string()),
            ),
            response: self.raw.clone(),
        }
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} [{code}]: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Errors surfaced by sync engine entry points.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad request: unknown license, missing credentials, unusable job.
    /// Fails fast; nothing is created.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A regulator call failed where the caller needs the result directly
    /// (pull phases, reconciliation).
    #[error("Regulator API error: {0}")]
    Api(ApiFailure),

    #[error("Cancelled")]
    Cancelled,

    /// A local collaborator (record source, change source, mapper) failed.
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl SyncError {
    /// Map a missing row to `NotFound`, leaving other database errors intact.
    pub(crate) fn not_found_or(entity: &'static str, id: &str) -> impl FnOnce(DatabaseError) -> Self {
        let id = id.to_string();
        move |e| match e {
            DatabaseError::NoResult => Self::NotFound { entity, id },
            other => Self::Database(other),
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::NotSyncable { .. } => Self::Validation(error.to_string()),
            CoreError::InvalidTransition { .. } => Self::InvalidState(error.to_string()),
        }
    }
}

impl From<ApiFailure> for SyncError {
    fn from(failure: ApiFailure) -> Self {
        Self::Api(failure)
    }
}
