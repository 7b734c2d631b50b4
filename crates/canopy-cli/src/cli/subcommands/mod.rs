mod checkpoint;
mod license;
mod queue;
mod sync;

pub use checkpoint::CheckpointCommands;
pub use license::LicenseCommands;
pub use queue::QueueCommands;
pub use sync::SyncCommands;
