//! Command-line surface and setup for the offdeck maintenance daemon.

use anyhow::{Context, Result};
use clap::Parser;
use offdeck_storage::Database;
use offdeck_sync::{SyncConfig, SyncEngine};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "offdeck-daemon")]
#[command(about = "Runs offdeck sync maintenance against a local database")]
pub struct Args {
    /// Path to the SQLite database (created if missing)
    #[arg(short, long, default_value = "offdeck.db")]
    pub db: PathBuf,

    /// Path to a JSON sync config; defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Installs the global subscriber. `RUST_LOG` overrides the level.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Reads the config file named on the command line, if any.
pub fn load_config(args: &Args) -> Result<SyncConfig> {
    match &args.config {
        Some(path) => SyncConfig::from_path(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(SyncConfig::default()),
    }
}

/// Opens the database and wires the engine.
pub fn build_engine(args: &Args) -> Result<SyncEngine> {
    let config = load_config(args)?;
    let db = Database::open(&args.db)
        .with_context(|| format!("opening database {}", args.db.display()))?;
    Ok(SyncEngine::new(&db, config)?)
}
