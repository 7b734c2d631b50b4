use clap::Subcommand;

use crate::cli::subcommands::{CheckpointCommands, LicenseCommands, QueueCommands, SyncCommands};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Registered regulator licenses.
    License {
        #[command(subcommand)]
        action: LicenseCommands,
    },
    /// Sync jobs.
    Sync {
        #[command(subcommand)]
        action: SyncCommands,
    },
    /// Outbox maintenance.
    Queue {
        #[command(subcommand)]
        action: QueueCommands,
    },
    /// Incremental sync watermarks.
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointCommands,
    },
}
