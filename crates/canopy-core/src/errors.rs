//! Domain rule violations detected without touching storage.
//!
//! Callers in `canopy-sync` map these onto their own error kinds: rule
//! violations on a request become validation errors, illegal status changes
//! become state errors.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// The record cannot take part in a sync as it stands.
    #[error("{entity} {id} cannot be synced: {reason}")]
    NotSyncable {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// A status change outside the entity's state machine.
    #[error("Invalid state transition: {entity} {id} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },
}
