//! Octoharvest main entry point
//!
//! This is the command-line interface for the harvester.

use clap::{CommandFactory, Parser};
use octoharvest::{Harvester, HarvestConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Octoharvest: a resumable GitHub metadata and commit-history harvester
///
/// Octoharvest continuously pulls repository metadata and commit history
/// into a SQLite database, resuming exactly where it left off after a
/// crash and staying inside the API's request budget.
#[derive(Parser, Debug)]
#[command(name = "octoharvest")]
#[command(version)]
#[command(about = "Harvests repository metadata and commit history into SQLite", long_about = None)]
struct Cli {
    /// Path to the SQLite database file
    #[arg(value_name = "DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();

    let cli = Cli::parse();

    // No database argument: show usage and exit cleanly
    let Some(database) = cli.database else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = HarvestConfig::default();
    tracing::info!(
        database = %database.display(),
        workers = config.workers,
        "starting harvester"
    );

    let harvester = Harvester::new(&database, config)?;
    harvester.run().await?;

    Ok(())
}

/// Sets up the logging/tracing subscriber
fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("octoharvest=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
