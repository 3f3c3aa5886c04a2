//! Benchfleet Runner
//!
//! A worker that executes the benchmark suite of one experiment.
//!
//! Architecture:
//! - Configuration: flags written by the launcher script
//! - Scheduler: fetches the catalog, randomizes the execution order and
//!   reports measurements in batches
//! - Execution: checks out revisions and runs `go test -bench`
//! - Artifacts: uploads CPU profiles and the log file once the suite is done

mod artifacts;
mod config;
mod execution;
mod scheduler;

use anyhow::{Context, Result};
use benchfleet_client::CoordinatorClient;
use benchfleet_client::auth::TokenSource;
use benchfleet_client::storage::{GcsObjectStore, LocalObjectStore, ObjectStore};
use benchfleet_core::environment::parse_env_pairs;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::artifacts::ArtifactUploader;
use crate::config::Config;
use crate::execution::{Executor, GoBenchExecutor};
use crate::scheduler::{Coordinator, SuiteOptions, SuiteRunner};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let log_file = std::fs::File::create(&config.log_file)
        .with_context(|| format!("Failed to create log file {}", config.log_file.display()))?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "benchfleet_runner=debug,benchfleet_client=debug,benchfleet_core=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    info!("Starting Benchfleet Runner");
    config.validate()?;
    info!(
        "Loaded configuration: orchestrator={}:{}/{}, tags={:?}, {}",
        config.orchestrator_ip,
        config.benchmark_list_port,
        config.measurement_report_port,
        config.tags,
        config.setup()
    );

    let project_path = config.project_path();
    let envs = parse_env_pairs(&config.envs);

    let coordinator: Arc<dyn Coordinator> = Arc::new(
        CoordinatorClient::new(
            config.orchestrator_ip.clone(),
            config.benchmark_list_port,
            config.measurement_report_port,
        )
        .with_connect_timeout(config.connect_timeout()),
    );
    let executor: Arc<dyn Executor> = Arc::new(GoBenchExecutor::new(
        config.bed,
        config.generate_pprof,
        envs.clone(),
    ));

    let options = SuiteOptions {
        project_path: project_path.clone(),
        tags: config.tags.clone(),
        iterations: config.iterations,
        suite_runs: config.sr,
        flush_every: config.flush_every,
        commands: config.commands.clone(),
        envs,
    };

    let runner = SuiteRunner::new(coordinator, executor, options, StdRng::from_os_rng());
    let outcome = runner.run().await;
    if let Err(e) = &outcome {
        error!("Benchmark suite aborted: {:#}", e);
    }

    let store: Box<dyn ObjectStore> = match &config.storage_dir {
        Some(dir) => Box::new(LocalObjectStore::new(dir)),
        None => Box::new(GcsObjectStore::new(
            config.project_name.clone(),
            config.bucket_name.clone(),
            TokenSource::for_instance(),
        )),
    };
    let uploader = ArtifactUploader::new(store.as_ref(), config.experiment_tag.clone());
    let uploaded = uploader
        .upload_all(&project_path, config.generate_pprof, &config.log_file)
        .await;
    info!("Uploaded {} artifacts", uploaded);

    outcome.map(|_| ())
}
