//! Benchmark execution
//!
//! The scheduler drives execution through [`Executor`]; the go toolchain
//! implementation lives in [`go`].

mod go;
pub mod parse;

pub use go::{GoBenchExecutor, PROFILE_DIR};

use async_trait::async_trait;
use benchfleet_core::domain::{Benchmark, Measurement};
use benchfleet_core::environment::CommandError;
use std::path::Path;
use thiserror::Error;

/// Position of one execution in the schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// 1-based occurrence of the benchmark within the suite run
    pub iteration_index: u32,
    /// 1-based suite run
    pub suite_run_index: u32,
    pub tag: String,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` produced no benchmark results")]
    NoResults { command: String },
}

/// Checks out revisions and runs benchmarks
#[async_trait]
pub trait Executor: Send + Sync {
    /// Switches the checkout at `project` to `tag`
    async fn checkout(&self, project: &Path, tag: &str) -> Result<(), ExecutionError>;

    /// Runs `bench` once for the configured duration
    async fn execute(&self, bench: &Benchmark, slot: &Slot)
    -> Result<Vec<Measurement>, ExecutionError>;
}
