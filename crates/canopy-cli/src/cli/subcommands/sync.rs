use clap::Subcommand;

/// Sync job commands.
#[derive(Clone, Debug, Subcommand)]
pub enum SyncCommands {
    /// Start a sync job, or report the one already running.
    ///
    /// The CLI only records the job. A process hosting the sync engine
    /// executes it when it resumes active jobs.
    Start {
        license_number: String,
        /// pull, push, or bidirectional
        #[arg(long, default_value = "bidirectional")]
        direction: String,
        /// Discard watermarks and read everything.
        #[arg(long)]
        force_full: bool,
        #[arg(long)]
        initiated_by: Option<String>,
    },
    /// License sync status: active job, queue counts, checkpoints.
    Status { license_number: String },
    /// Get a sync job.
    Job { id: String },
    /// List recent sync jobs for a site or a license.
    Jobs {
        #[arg(long, required_unless_present = "license", conflicts_with = "license")]
        site: Option<String>,
        #[arg(long)]
        license: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Cancel a running sync job.
    Cancel {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List a job's queue items.
    Items {
        id: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Reset a job's failed items to pending.
    Retry { id: String },
    /// Start jobs for licenses whose auto-sync interval has elapsed.
    ///
    /// Like `start`, the jobs run in a process hosting the sync engine.
    Due,
}
