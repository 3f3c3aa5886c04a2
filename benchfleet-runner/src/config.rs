//! Runner configuration
//!
//! All parameters arrive as flags from the launcher script that boots the
//! worker; every flag can also be given through the environment.

use benchfleet_core::domain::Setup;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runner configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "benchfleet-runner")]
#[command(about = "Executes a benchmark suite and reports to the orchestrator", long_about = None)]
pub struct Config {
    /// Checkout of the project under test
    #[arg(long, env = "BENCHFLEET_PATH")]
    pub path: PathBuf,

    /// Revision tags to compare, comma separated
    #[arg(long, env = "BENCHFLEET_TAGS", value_delimiter = ',', required = true)]
    pub tags: Vec<String>,

    /// Benchmark execution duration in seconds
    #[arg(long, default_value_t = 1)]
    pub bed: u32,

    /// Number of iterations of every benchmark per suite run
    #[arg(long, default_value_t = 1)]
    pub iterations: u32,

    /// Number of suite runs
    #[arg(long, default_value_t = 1)]
    pub sr: u32,

    #[arg(long, env = "BENCHFLEET_ORCHESTRATOR_IP", default_value = "127.0.0.1")]
    pub orchestrator_ip: String,

    #[arg(long, default_value_t = 5002)]
    pub benchmark_list_port: u16,

    #[arg(long, default_value_t = 5003)]
    pub measurement_report_port: u16,

    /// Project billed for artifact uploads
    #[arg(long, default_value = "default")]
    pub project_name: String,

    /// Bucket receiving profiles and the log file
    #[arg(long, default_value = "default")]
    pub bucket_name: String,

    /// Write a CPU profile for every execution and upload them at the end
    #[arg(long)]
    pub generate_pprof: bool,

    /// `KEY=VALUE` passed to every spawned process (repeatable)
    #[arg(long = "env")]
    pub envs: Vec<String>,

    /// Shell command run in the project before benchmarking (repeatable)
    #[arg(long = "command")]
    pub commands: Vec<String>,

    /// Number of executions between two result reports
    #[arg(long, default_value_t = 50)]
    pub flush_every: usize,

    /// Prefix of the uploaded artifacts
    #[arg(long, default_value = "benchfleet")]
    pub experiment_tag: String,

    #[arg(long, default_value = "log.txt")]
    pub log_file: PathBuf,

    /// Store artifacts in this directory instead of the bucket
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Seconds to wait for a connection to the orchestrator
    #[arg(long, default_value_t = 30)]
    pub connect_timeout: u64,
}

impl Config {
    /// Project path with repeated separators collapsed
    pub fn project_path(&self) -> PathBuf {
        normalize(&self.path)
    }

    pub fn setup(&self) -> Setup {
        Setup {
            duration_per_job: self.bed,
            iterations: self.iterations,
            suite_runs: self.sr,
            worker_count: 1,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.path.as_os_str().is_empty() {
            anyhow::bail!("path cannot be empty");
        }

        if self.tags.is_empty() || self.tags.iter().any(|t| t.trim().is_empty()) {
            anyhow::bail!("tags cannot be empty");
        }

        self.setup().validate()?;

        if self.flush_every == 0 {
            anyhow::bail!("flush_every must be greater than 0");
        }

        if self.benchmark_list_port == 0 || self.measurement_report_port == 0 {
            anyhow::bail!("orchestrator ports must be set");
        }

        Ok(())
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}
