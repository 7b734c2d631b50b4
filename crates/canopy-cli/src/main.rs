use anyhow::Context;
use clap::Parser;

mod bootstrap;
mod cli;
mod commands;
mod context;
mod output;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("canopy error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let flags = cli.global_flags();
    let config = bootstrap::load_config(&flags)?;
    let ctx = context::AppContext::init(config)
        .await
        .context("failed to initialize canopy application context")?;

    commands::dispatch::dispatch(cli.command, &ctx, &flags).await
}

/// Install the stderr subscriber. `CANOPY_LOG` overrides the flag-derived
/// filter entirely.
fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let directives = match (quiet, verbose) {
        (true, _) => "error",
        (false, true) => "warn,canopy_sync=debug,canopy_db=debug,canopy_cli=debug",
        (false, false) => "warn",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("CANOPY_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("cannot install tracing subscriber: {error}"))
}
