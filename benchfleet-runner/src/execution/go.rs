//! Go toolchain executor

use async_trait::async_trait;
use benchfleet_core::domain::{Benchmark, Measurement};
use benchfleet_core::environment::CommandError;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use super::parse::parse_output;
use super::{ExecutionError, Executor, Slot};

/// Directory, inside the project, receiving CPU profiles
pub const PROFILE_DIR: &str = "cpu";

/// Runs benchmarks with `go test -bench` in one-second slots
pub struct GoBenchExecutor {
    duration_per_job: u32,
    generate_pprof: bool,
    envs: Vec<(String, String)>,
}

impl GoBenchExecutor {
    /// Creates a new executor
    ///
    /// # Arguments
    /// * `duration_per_job` - Number of one-second slots per execution
    /// * `generate_pprof` - Write a CPU profile for every slot
    /// * `envs` - Environment passed to every spawned process
    pub fn new(duration_per_job: u32, generate_pprof: bool, envs: Vec<(String, String)>) -> Self {
        Self {
            duration_per_job,
            generate_pprof,
            envs,
        }
    }

    async fn run(&self, program: &str, args: &[String], dir: &Path) -> Result<Output, CommandError> {
        let command = format!("{} {}", program, args.join(" "));
        debug!("Running {}", command);

        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(CommandError::Failed {
                command,
                status: output.status,
                output: combined.trim().to_string(),
            });
        }

        Ok(output)
    }
}

/// Profile path of one slot: `<project>/cpu/<name>_<it>_<sr>_<tag>.out`
pub fn profile_path(project: &Path, bench: &Benchmark, slot: &Slot) -> PathBuf {
    let file = format!(
        "{}_{}_{}_{}.out",
        bench.name, slot.iteration_index, slot.suite_run_index, slot.tag
    )
    .replace('/', "_");
    project.join(PROFILE_DIR).join(file)
}

#[async_trait]
impl Executor for GoBenchExecutor {
    async fn checkout(&self, project: &Path, tag: &str) -> Result<(), ExecutionError> {
        self.run("git", &["checkout".to_string(), tag.to_string()], project)
            .await?;
        Ok(())
    }

    async fn execute(
        &self,
        bench: &Benchmark,
        slot: &Slot,
    ) -> Result<Vec<Measurement>, ExecutionError> {
        let project = bench.project_path.as_path();
        self.run("go", &["clean".to_string(), "--cache".to_string()], project)
            .await?;

        let mut args = vec![
            "test".to_string(),
            "-benchtime".to_string(),
            "1s".to_string(),
            "-bench".to_string(),
            bench.name_pattern.clone(),
            bench.package.clone(),
        ];
        if self.generate_pprof {
            let profile = profile_path(project, bench, slot);
            if let Some(dir) = profile.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            args.push("-cpuprofile".to_string());
            args.push(profile.to_string_lossy().into_owned());
        }

        let mut measurements = Vec::new();
        for duration_slot in 1..=self.duration_per_job {
            let output = self.run("go", &args, project).await?;
            let parsed = parse_output(&String::from_utf8_lossy(&output.stdout), duration_slot, slot);
            if parsed.is_empty() {
                return Err(ExecutionError::NoResults {
                    command: format!("go {}", args.join(" ")),
                });
            }
            measurements.extend(parsed);
        }

        Ok(measurements)
    }
}
