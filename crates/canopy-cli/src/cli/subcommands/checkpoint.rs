use clap::Subcommand;

/// Checkpoint commands.
#[derive(Clone, Debug, Subcommand)]
pub enum CheckpointCommands {
    /// List a license's checkpoints.
    List { license_number: String },
    /// Clear checkpoints so the next sync reads everything.
    Reset {
        license_number: String,
        #[arg(long)]
        entity_type: Option<String>,
    },
}
