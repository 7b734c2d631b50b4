//! Repository modules implementing persistence for all Canopy entities.
//!
//! Each module adds methods to `CanopyService` via `impl CanopyService` blocks.

pub mod checkpoint;
pub mod license;
pub mod queue_item;
pub mod sync_job;
