use clap::Subcommand;

/// License commands.
#[derive(Clone, Debug, Subcommand)]
pub enum LicenseCommands {
    /// Register a license.
    Add {
        license_number: String,
        #[arg(long)]
        site: String,
        #[arg(long)]
        state: String,
        /// Reference to regulator credentials in the secret store.
        #[arg(long)]
        credential_ref: Option<String>,
        #[arg(long)]
        auto_sync: bool,
        #[arg(long)]
        interval_minutes: Option<u32>,
    },
    /// Get a license by number.
    Get { license_number: String },
    /// List licenses.
    List {
        #[arg(long)]
        site: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Update a license.
    Update {
        license_number: String,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        credential_ref: Option<String>,
        /// Remove the stored credential reference.
        #[arg(long, conflicts_with = "credential_ref")]
        clear_credentials: bool,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        auto_sync: Option<bool>,
        #[arg(long)]
        interval_minutes: Option<u32>,
    },
}
