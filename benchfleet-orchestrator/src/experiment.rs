//! Experiment main sequence
//!
//! discover -> serve -> set up -> publish bootstrap -> provision -> wait for
//! every worker -> grace period -> decommission -> stop serving

use anyhow::{Context, Result};
use benchfleet_client::auth::TokenSource;
use benchfleet_client::storage::{GcsObjectStore, LocalObjectStore, ObjectStore};
use benchfleet_core::environment::{parse_env_pairs, run_commands};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::bootstrap::{self, LaunchParams};
use crate::config::{Args, ExperimentConfig};
use crate::context::ExperimentContext;
use crate::db;
use crate::discovery;
use crate::fleet::{ControlPlane, FleetManager, GceControlPlane};
use crate::repository::measurement_repository;
use crate::server::Endpoints;

/// Runs one experiment from start to finish
pub async fn run(args: &Args, config: &ExperimentConfig) -> Result<()> {
    let envs = parse_env_pairs(&config.envs);
    run_commands(&config.commands, &config.path, &envs)
        .await
        .context("Pre-run command failed")?;

    info!("Connecting to database {}", args.db.display());
    let pool = db::create_pool(&args.db)
        .await
        .context("Failed to open database")?;
    if args.clean_db {
        db::clean(&pool).await.context("Failed to clean database")?;
    }
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let catalog = discovery::discover(&config.path, &config.base_package, &args.bench, &envs)
        .await
        .with_context(|| format!("Failed to collect benchmarks of {}", config.name))?;

    let ctx = Arc::new(ExperimentContext::new(pool, catalog));
    let endpoints = Endpoints::start(
        Arc::clone(&ctx),
        &args.bind,
        args.benchmark_list_port,
        args.measurement_report_port,
    )
    .await
    .context("Failed to start endpoints")?;

    let outcome = conduct(args, config, &ctx).await;
    endpoints.shutdown().await;

    summarize(&ctx).await;
    outcome
}

async fn summarize(ctx: &ExperimentContext) {
    match measurement_repository::count_by_run(ctx.pool(), ctx.run_id()).await {
        Ok(stored) => info!(
            "Experiment {} collected {} measurements ({} stored)",
            ctx.run_id(),
            ctx.measurement_count(),
            stored
        ),
        Err(e) => warn!(
            "Experiment {} collected {} measurements; stored count unavailable: {}",
            ctx.run_id(),
            ctx.measurement_count(),
            e
        ),
    }

    for bench in ctx.catalog_snapshot() {
        match measurement_repository::find_by_benchmark(
            ctx.pool(),
            ctx.run_id(),
            &bench.name,
            &bench.package,
        )
        .await
        {
            Ok(stored) => debug!("{}: {} measurements stored", bench.name, stored.len()),
            Err(e) => warn!("Could not read measurements of {}: {}", bench.name, e),
        }
    }
}

async fn conduct(args: &Args, config: &ExperimentConfig, ctx: &ExperimentContext) -> Result<()> {
    let setup = config.setup();
    ctx.begin(setup);

    let tokens = TokenSource::detect(args.credentials.as_deref());
    let store = object_store(args, config, tokens.clone());
    let runner_source = match &args.storage_dir {
        None if !config.gcp_bucket.is_empty() => format!(
            "gs://{}/{}",
            config.gcp_bucket,
            bootstrap::runner_key(&args.instance_name)
        ),
        _ => store.url(&bootstrap::runner_key(&args.instance_name)),
    };

    let launcher = bootstrap::render_launcher(
        &LaunchParams {
            proj_uri: &config.proj_uri,
            tags: &config.tags,
            setup,
            orchestrator_ip: &args.ip,
            list_port: args.benchmark_list_port,
            report_port: args.measurement_report_port,
            project: &config.gcp_project,
            bucket: &config.gcp_bucket,
            experiment_tag: &config.name,
            generate_pprof: config.gen_pprof,
            envs: &config.envs,
            commands: &config.commands,
        },
        &runner_source,
    )?;
    let startup_url = bootstrap::publish(
        store.as_ref(),
        &args.instance_name,
        launcher,
        &args.runner_binary()?,
        !args.local,
    )
    .await?;

    if args.local {
        info!("Running locally; waiting for one runner");
        ctx.barrier().arm(1);
        return wait_for_workers(ctx, args.barrier_timeout()).await;
    }

    let control: Arc<dyn ControlPlane> = Arc::new(GceControlPlane::new(&config.gcp_project, tokens));
    let fleet = FleetManager::new(control, config.machine_profile());
    run_fleet(
        ctx,
        &fleet,
        &FleetPlan {
            base: &args.instance_name,
            startup_url: &startup_url,
            grace: args.grace_period(),
            barrier_timeout: args.barrier_timeout(),
        },
    )
    .await
}

/// Parameters of the remote part of an experiment
struct FleetPlan<'a> {
    /// Orchestrator instance name the workers are named after
    base: &'a str,
    startup_url: &'a str,
    /// Pause between the last completion and decommissioning
    grace: Duration,
    barrier_timeout: Option<Duration>,
}

/// Provisions the workers, waits for all of them and removes them again
///
/// The barrier is armed before the first worker exists. Only the instances
/// created here are removed, also when provisioning or waiting fails.
async fn run_fleet(ctx: &ExperimentContext, fleet: &FleetManager, plan: &FleetPlan<'_>) -> Result<()> {
    let workers = ctx.setup().worker_count;
    ctx.barrier().arm(workers);

    let names = match fleet.provision(plan.base, workers, plan.startup_url).await {
        Ok(names) => names,
        Err(e) => {
            let created = fleet.provisioned();
            warn!("Provisioning failed; removing {} created instances", created.len());
            if let Err(cleanup) = fleet.decommission(&created).await {
                error!("Failed to remove instances {:?}: {}", created, cleanup);
            }
            return Err(e).context("Failed to provision workers");
        }
    };
    info!("Provisioned {} workers: {:?}", names.len(), names);

    let waited = wait_for_workers(ctx, plan.barrier_timeout).await;

    // give the workers time to upload their logs
    info!("Waiting {:?} before removing instances", plan.grace);
    tokio::time::sleep(plan.grace).await;
    fleet
        .decommission(&names)
        .await
        .context("Failed to remove instances")?;

    waited
}

async fn wait_for_workers(ctx: &ExperimentContext, timeout: Option<Duration>) -> Result<()> {
    match timeout {
        Some(limit) => ctx
            .barrier()
            .wait_timeout(limit)
            .await
            .context("Workers did not finish in time")?,
        None => ctx.barrier().wait().await,
    }

    let (released, _) = ctx.barrier().progress();
    info!("All {} workers finished", released);
    Ok(())
}

fn object_store(args: &Args, config: &ExperimentConfig, tokens: TokenSource) -> Box<dyn ObjectStore> {
    match &args.storage_dir {
        Some(dir) => Box::new(LocalObjectStore::new(dir)),
        None if args.local && config.gcp_bucket.is_empty() => {
            Box::new(LocalObjectStore::new(PathBuf::from("artifacts")))
        }
        None => Box::new(GcsObjectStore::new(
            &config.gcp_project,
            &config.gcp_bucket,
            tokens,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::fake::{FakeControlPlane, profile};
    use benchfleet_core::domain::{Catalog, Setup};

    async fn context(worker_count: u32) -> ExperimentContext {
        let pool = db::memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let ctx = ExperimentContext::new(pool, Catalog::default());
        ctx.begin(Setup {
            duration_per_job: 1,
            iterations: 1,
            suite_runs: 1,
            worker_count,
        });
        ctx
    }

    fn plan(grace: Duration, barrier_timeout: Option<Duration>) -> FleetPlan<'static> {
        FleetPlan {
            base: "orch",
            startup_url: "https://storage.googleapis.com/bucket/orch/startup.sh",
            grace,
            barrier_timeout,
        }
    }

    #[tokio::test]
    async fn test_fleet_removed_only_after_every_worker_finished() {
        let ctx = context(2).await;
        let control = Arc::new(FakeControlPlane::with(&["other-instance-9"]));
        let fleet = FleetManager::new(control.clone(), profile());
        let plan = plan(Duration::from_millis(300), None);

        let workers = async {
            while control.names().len() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(ctx.barrier().progress(), (0, 2));

            ctx.complete_worker().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(control.deleted().is_empty());

            ctx.complete_worker().await.unwrap();
            // still inside the grace period
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(control.deleted().is_empty());
        };

        let (result, ()) = tokio::join!(run_fleet(&ctx, &fleet, &plan), workers);
        result.unwrap();

        assert_eq!(control.deleted(), vec!["orch-instance-0", "orch-instance-1"]);
        assert_eq!(control.names(), vec!["other-instance-9"]);
    }

    #[tokio::test]
    async fn test_barrier_timeout_still_removes_fleet() {
        let ctx = context(2).await;
        let control = Arc::new(FakeControlPlane::with(&["other-instance-9"]));
        let fleet = FleetManager::new(control.clone(), profile());

        ctx.complete_worker().await.unwrap();
        let result = run_fleet(
            &ctx,
            &fleet,
            &plan(Duration::ZERO, Some(Duration::from_millis(100))),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(ctx.barrier().progress(), (1, 2));
        assert_eq!(control.names(), vec!["other-instance-9"]);
    }

    #[tokio::test]
    async fn test_provisioning_failure_removes_created_workers() {
        let ctx = context(3).await;
        let control = Arc::new(FakeControlPlane::with(&["other-instance-9"]).failing_on("orch-instance-1"));
        let fleet = FleetManager::new(control.clone(), profile());

        let result = run_fleet(&ctx, &fleet, &plan(Duration::ZERO, None)).await;

        assert!(result.is_err());
        assert_eq!(control.deleted(), vec!["orch-instance-0"]);
        assert_eq!(control.names(), vec!["other-instance-9"]);
    }
}
