//! offdeck maintenance daemon
//!
//! Opens the sync database and runs the periodic sweeps: purging old
//! completed intents and re-arming recent failures.
//!
//! Usage:
//!   offdeck-daemon --db /var/lib/offdeck/offdeck.db --config sync.json

use anyhow::{Context, Result};
use clap::Parser;
use offdeck_daemon::{build_engine, init_tracing, Args};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    info!("offdeck daemon starting...");
    let engine = build_engine(&args)?;
    let config = engine.config();
    info!(
        "Database {} (cleanup every {:?}, re-arm every {:?})",
        args.db.display(),
        config.cleanup_interval(),
        config.rearm_interval()
    );

    let scheduler = engine.start_maintenance();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown requested");
    scheduler.stop().await;

    Ok(())
}
