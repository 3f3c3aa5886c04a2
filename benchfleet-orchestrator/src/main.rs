//! Benchfleet Orchestrator
//!
//! Coordinates one benchmark experiment:
//! - Discovery: lists the benchmarks of the project under test
//! - Endpoints: hand out the job list and collect measurements over TCP
//! - Fleet: creates the worker instances and deletes them when all are done
//! - Persistence: stores every received measurement in SQLite

mod barrier;
mod bootstrap;
mod config;
mod context;
mod db;
mod discovery;
mod experiment;
mod fleet;
mod repository;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Args, ExperimentConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = std::fs::File::create(&args.log_file)
        .with_context(|| format!("Failed to create log file {}", args.log_file.display()))?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "benchfleet_orchestrator=debug,benchfleet_client=debug,benchfleet_core=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    tracing::info!("Starting Benchfleet Orchestrator...");

    let config = ExperimentConfig::load(&args.config_file)?;
    config.validate(args.local)?;
    tracing::debug!("Finished reading {}: {:?}", args.config_file.display(), config);

    tracing::info!("Experiment {}: {}", config.name, config.setup());
    if let Err(e) = experiment::run(&args, &config).await {
        tracing::error!("Experiment failed: {:#}", e);
        return Err(e);
    }

    tracing::info!("Finished experiment");
    Ok(())
}
