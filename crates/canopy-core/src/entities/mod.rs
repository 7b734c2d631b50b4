//! Entity structs for the compliance sync records.
//!
//! Each entity maps to a table in the libSQL database. All structs derive
//! `Serialize`, `Deserialize`, and `JsonSchema` for JSON output and schema
//! validation. Records are plain values; state changes go through the
//! explicit transition functions next to each type.

mod checkpoint;
mod license;
mod queue_item;
mod sync_job;

pub use checkpoint::SyncCheckpoint;
pub use license::License;
pub use queue_item::{FailureTransition, ItemError, QueueItem, idempotency_key, next_after_failure};
pub use sync_job::{JobCounts, SyncJob};
