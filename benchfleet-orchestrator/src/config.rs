//! Orchestrator configuration
//!
//! Command-line flags describe how this orchestrator runs; the TOML
//! experiment file describes what is measured and on which machines.

use anyhow::{Context, Result, bail};
use benchfleet_core::domain::Setup;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fleet::MachineProfile;

#[derive(Parser, Debug, Clone)]
#[command(name = "benchfleet-orchestrator")]
#[command(about = "Runs a benchmark experiment on a fleet of cloud workers", long_about = None)]
pub struct Args {
    /// Path to the experiment configuration (TOML)
    #[arg(long, env = "BENCHFLEET_CONFIG", default_value = "configFile.toml")]
    pub config_file: PathBuf,

    /// Credentials file for the cloud APIs
    #[arg(long, env = "BENCHFLEET_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// SQLite database receiving the measurements
    #[arg(long, default_value = "database.db")]
    pub db: PathBuf,

    /// Drop all benchmark tables before starting
    #[arg(long)]
    pub clean_db: bool,

    /// Run without creating instances and wait for one local runner
    #[arg(long)]
    pub local: bool,

    /// Go -bench style expression restricting the benchmarks to run
    #[arg(long, default_value = ".")]
    pub bench: String,

    /// Name of this orchestrator; workers are named after it
    #[arg(long, default_value = "orchestrator")]
    pub instance_name: String,

    /// Address at which runners reach this node
    #[arg(long, default_value = "127.0.0.1")]
    pub ip: String,

    /// Address the endpoints bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Port serving the benchmark list
    #[arg(long, default_value_t = 5002)]
    pub benchmark_list_port: u16,

    /// Port receiving measurement reports
    #[arg(long, default_value_t = 5003)]
    pub measurement_report_port: u16,

    /// Runner binary published for the workers [default: benchfleet-runner next to this binary]
    #[arg(long)]
    pub runner_binary: Option<PathBuf>,

    /// Seconds to wait after the last worker finished before deleting the fleet
    #[arg(long, default_value_t = 10)]
    pub grace_period: u64,

    /// Give up waiting for workers after this many seconds
    #[arg(long)]
    pub barrier_timeout: Option<u64>,

    /// Publish artifacts into this directory instead of the bucket
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Log file written next to the console output
    #[arg(long, default_value = "log-orchestrator.txt")]
    pub log_file: PathBuf,
}

impl Args {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period)
    }

    pub fn barrier_timeout(&self) -> Option<Duration> {
        self.barrier_timeout.map(Duration::from_secs)
    }

    pub fn runner_binary(&self) -> Result<PathBuf> {
        match &self.runner_binary {
            Some(path) => Ok(path.clone()),
            None => {
                let exe = std::env::current_exe().context("Failed to locate own executable")?;
                Ok(exe.with_file_name("benchfleet-runner"))
            }
        }
    }
}

fn default_disk_size() -> u32 {
    10
}

fn default_machine_type() -> String {
    "e2-standard-2".to_string()
}

fn default_service_account() -> String {
    "default".to_string()
}

/// The experiment file
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    /// Experiment name, also used as the artifact prefix
    pub name: String,
    /// Local checkout of the project under test
    pub path: PathBuf,
    /// Clone URL of the project for the workers
    #[serde(default)]
    pub proj_uri: String,
    /// Revision tags to compare
    pub tags: Vec<String>,
    /// Shell commands run in the project before discovery and execution
    #[serde(default)]
    pub commands: Vec<String>,
    /// `KEY=VALUE` entries for every spawned process
    #[serde(default)]
    pub envs: Vec<String>,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub base_package: String,
    #[serde(default)]
    pub gcp_project: String,
    #[serde(default)]
    pub gcp_bucket: String,
    #[serde(default)]
    pub gcp_image: String,
    #[serde(default = "default_disk_size")]
    pub gcp_disk_size: u32,
    #[serde(default = "default_machine_type")]
    pub gcp_machine_type: String,
    #[serde(default = "default_service_account")]
    pub gcp_service_account: String,
    #[serde(default)]
    pub gen_pprof: bool,
    pub bed: u32,
    pub it: u32,
    pub sr: u32,
    pub ir: u32,
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid experiment file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        Ok(config)
    }

    pub fn setup(&self) -> Setup {
        Setup {
            duration_per_job: self.bed,
            iterations: self.it,
            suite_runs: self.sr,
            worker_count: self.ir,
        }
    }

    pub fn machine_profile(&self) -> MachineProfile {
        MachineProfile {
            project: self.gcp_project.clone(),
            region: self.region.clone(),
            zone: self.zone.clone(),
            image: self.gcp_image.clone(),
            machine_type: self.gcp_machine_type.clone(),
            disk_size_gb: self.gcp_disk_size,
            service_account: self.gcp_service_account.clone(),
        }
    }

    /// Checks the fields needed in every mode, plus the cloud fields unless `local`
    pub fn validate(&self, local: bool) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name cannot be empty");
        }
        if self.tags.is_empty() {
            bail!("at least one tag is required");
        }
        self.setup().validate()?;

        if local {
            return Ok(());
        }

        let required = [
            ("proj_uri", &self.proj_uri),
            ("zone", &self.zone),
            ("region", &self.region),
            ("gcp_project", &self.gcp_project),
            ("gcp_bucket", &self.gcp_bucket),
            ("gcp_image", &self.gcp_image),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                bail!("{} is required when creating instances", field);
            }
        }
        if self.gcp_disk_size == 0 {
            bail!("gcp_disk_size must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPERIMENT: &str = r#"
        name = "sort-study"
        path = "/home/bench/proj"
        proj_uri = "https://github.com/example/proj.git"
        tags = ["v1.0.0", "v1.1.0"]
        commands = ["go mod download"]
        envs = ["GOMAXPROCS=2"]
        zone = "europe-west3-c"
        region = "europe-west3"
        gcp_project = "bench-project"
        gcp_bucket = "bench-bucket"
        gcp_image = "bench-image"
        gcp_disk_size = 20
        gen_pprof = true
        bed = 3
        it = 5
        sr = 2
        ir = 4
    "#;

    #[test]
    fn test_parse_experiment() {
        let config = ExperimentConfig::parse(EXPERIMENT).unwrap();
        assert_eq!(config.name, "sort-study");
        assert_eq!(config.tags, vec!["v1.0.0", "v1.1.0"]);
        assert_eq!(config.gcp_machine_type, "e2-standard-2");
        assert!(config.gen_pprof);
        assert_eq!(config.setup().worker_count, 4);
        assert_eq!(config.machine_profile().disk_size_gb, 20);
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_local_mode_needs_no_cloud_fields() {
        let config = ExperimentConfig::parse(
            r#"
            name = "local"
            path = "."
            tags = ["main"]
            bed = 1
            it = 1
            sr = 1
            ir = 1
            "#,
        )
        .unwrap();

        assert!(config.validate(true).is_ok());
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_setup() {
        let mut config = ExperimentConfig::parse(EXPERIMENT).unwrap();
        config.sr = 0;
        assert!(config.validate(true).is_err());

        config.sr = 1;
        config.tags.clear();
        assert!(config.validate(true).is_err());
    }

    #[test]
    fn test_default_flags() {
        let args = Args::try_parse_from(["benchfleet-orchestrator"]).unwrap();
        assert_eq!(args.benchmark_list_port, 5002);
        assert_eq!(args.measurement_report_port, 5003);
        assert_eq!(args.db, PathBuf::from("database.db"));
        assert_eq!(args.grace_period(), Duration::from_secs(10));
        assert!(args.barrier_timeout().is_none());
        assert!(!args.local);
    }
}
