use clap::Subcommand;

/// Outbox commands.
#[derive(Clone, Debug, Subcommand)]
pub enum QueueCommands {
    /// Return items claimed longer ago than the timeout to pending.
    ReleaseStale {
        /// Defaults to `sync.claim_timeout_secs`.
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
}
