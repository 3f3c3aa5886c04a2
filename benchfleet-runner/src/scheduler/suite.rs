//! Suite runner
//!
//! Executes the catalog `suite_runs` times. Each suite run visits every
//! benchmark `iterations` times in a fresh random order, and every visit
//! runs the benchmark once per revision tag, in a fresh random tag order.
//! Randomizing both orders spreads slow drifts of the machine (thermal
//! state, caches, noisy neighbours) evenly over benchmarks and revisions.
//!
//! A benchmark that fails once is skipped for the rest of the experiment.
//! Results are reported every `flush_every` executions while execution
//! continues; at most one report is in flight at any time.

use anyhow::{Context, Result};
use benchfleet_client::ClientError;
use benchfleet_core::domain::Catalog;
use benchfleet_core::environment::run_commands;
use benchfleet_core::schedule::{extended_permutation, fisher_yates};
use rand::Rng;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Coordinator;
use crate::execution::{ExecutionError, Executor, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    Connecting,
    FetchingCatalog,
    Scheduling,
    Executing,
    Flushing,
    Done,
}

impl fmt::Display for RunnerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerPhase::Connecting => "connecting",
            RunnerPhase::FetchingCatalog => "fetching catalog",
            RunnerPhase::Scheduling => "scheduling",
            RunnerPhase::Executing => "executing",
            RunnerPhase::Flushing => "flushing",
            RunnerPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct SuiteOptions {
    pub project_path: PathBuf,
    pub tags: Vec<String>,
    pub iterations: u32,
    pub suite_runs: u32,
    pub flush_every: usize,
    pub commands: Vec<String>,
    pub envs: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Executions that produced measurements
    pub executed: usize,
    /// Executions that failed
    pub failed: usize,
    /// Scheduled executions skipped because the benchmark was failing
    pub skipped: usize,
    /// Completed result reports
    pub reports: usize,
    /// Measurements sent to the orchestrator
    pub reported: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} executed, {} failed, {} skipped, {} measurements in {} reports",
            self.executed, self.failed, self.skipped, self.reported, self.reports
        )
    }
}

pub struct SuiteRunner<R> {
    coordinator: Arc<dyn Coordinator>,
    executor: Arc<dyn Executor>,
    options: SuiteOptions,
    rng: R,
    phase: RunnerPhase,
    in_flight: Option<JoinHandle<Result<usize, ClientError>>>,
    summary: RunSummary,
}

impl<R: Rng> SuiteRunner<R> {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        executor: Arc<dyn Executor>,
        options: SuiteOptions,
        rng: R,
    ) -> Self {
        Self {
            coordinator,
            executor,
            options,
            rng,
            phase: RunnerPhase::Connecting,
            in_flight: None,
            summary: RunSummary::default(),
        }
    }

    fn enter(&mut self, phase: RunnerPhase) {
        if self.phase != phase {
            debug!("Runner phase: {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Runs the whole experiment on this worker
    ///
    /// Errors talking to the orchestrator abort the run; failing benchmarks
    /// do not.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!("Runner phase: {}", self.phase);
        self.enter(RunnerPhase::FetchingCatalog);
        let mut catalog = self
            .coordinator
            .fetch_catalog(&self.options.project_path)
            .await
            .context("Failed to fetch benchmarks from orchestrator")?;
        info!("Received {} benchmarks", catalog.len());

        run_commands(
            &self.options.commands,
            &self.options.project_path,
            &self.options.envs,
        )
        .await
        .context("Pre-run command failed")?;

        let mut since_flush = 0;
        for suite_run in 1..=self.options.suite_runs {
            self.enter(RunnerPhase::Scheduling);
            let order = extended_permutation(
                catalog.len(),
                self.options.iterations as usize,
                &mut self.rng,
            );
            let mut occurrences = vec![0u32; catalog.len()];
            info!(
                "Begin suite run {} of {} ({} scheduled visits)",
                suite_run,
                self.options.suite_runs,
                order.len()
            );

            for index in order {
                occurrences[index] += 1;
                let mut tags = self.options.tags.clone();
                fisher_yates(&mut tags, &mut self.rng);

                for tag in tags {
                    if !catalog[index].should_run() {
                        self.summary.skipped += 1;
                        continue;
                    }

                    self.enter(RunnerPhase::Executing);
                    let slot = Slot {
                        iteration_index: occurrences[index],
                        suite_run_index: suite_run,
                        tag,
                    };
                    self.execute(&mut catalog, index, &slot).await;

                    since_flush += 1;
                    if since_flush >= self.options.flush_every {
                        self.flush(&mut catalog).await?;
                        since_flush = 0;
                    }
                }
            }
            info!("Finished suite run {} of {}", suite_run, self.options.suite_runs);
        }

        self.flush(&mut catalog).await?;
        self.settle().await?;

        self.coordinator
            .signal_done()
            .await
            .context("Failed to signal completion to orchestrator")?;
        self.enter(RunnerPhase::Done);

        info!("Runner finished: {}", self.summary);
        Ok(self.summary)
    }

    async fn execute(&mut self, catalog: &mut Catalog, index: usize, slot: &Slot) {
        let bench = &catalog[index];
        debug!(
            "Executing {} iteration {} of {} on tag {}",
            bench.name, slot.iteration_index, self.options.iterations, slot.tag
        );

        let result: Result<_, ExecutionError> = async {
            self.executor.checkout(&bench.project_path, &slot.tag).await?;
            self.executor.execute(bench, slot).await
        }
        .await;

        match result {
            Ok(measurements) => {
                self.summary.executed += 1;
                catalog[index].measurements.extend(measurements);
            }
            Err(e) => {
                warn!(
                    "{} failed on tag {}; skipping it from now on: {}",
                    catalog[index].name, slot.tag, e
                );
                self.summary.failed += 1;
                catalog[index].mark_failing(e.to_string());
            }
        }
    }

    /// Hands all gathered measurements to a background report
    ///
    /// Waits for the previous report first so that reports never overlap.
    /// Periodic flushes and the final one alike run in the flushing phase.
    async fn flush(&mut self, catalog: &mut Catalog) -> Result<()> {
        self.enter(RunnerPhase::Flushing);
        self.settle().await?;

        let batch = catalog.take_measurements();
        if batch.is_empty() {
            return Ok(());
        }

        debug!("Reporting measurements of {} benchmarks", batch.len());
        let coordinator = Arc::clone(&self.coordinator);
        self.in_flight = Some(tokio::spawn(
            async move { coordinator.report(batch).await },
        ));
        Ok(())
    }

    /// Waits for the in-flight report, if any
    async fn settle(&mut self) -> Result<()> {
        if let Some(handle) = self.in_flight.take() {
            let sent = handle
                .await
                .context("Report task panicked")?
                .context("Failed to report measurements to orchestrator")?;
            self.summary.reports += 1;
            self.summary.reported += sent;
        }
        Ok(())
    }
}
