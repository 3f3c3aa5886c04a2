//! Benchmark domain types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::schedule::mask_name_to_pattern;

/// Reserved benchmark name marking the end of a result stream.
pub const SENTINEL_NAME: &str = "alldone";

/// One completed execution's timing outcome
///
/// Besides the raw numbers it carries the scheduling slot that produced it,
/// so ordering effects can be analysed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Iterations the benchmark harness settled on (`N`)
    pub iterations: u64,
    pub ns_per_op: f64,
    /// 1-based one-second slot within the benchmark execution duration
    pub duration_slot: u32,
    /// 1-based occurrence of the benchmark within its suite run
    pub iteration_index: u32,
    /// 1-based suite run
    pub suite_run_index: u32,
    /// 1-based result line within a single execution's output
    pub repetition_index: u32,
    pub revision_tag: String,
}

/// A single executable benchmark and the results gathered for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub name: String,

    /// Anchored pattern selecting exactly this benchmark, see [`mask_name_to_pattern`]
    pub name_pattern: String,

    /// Package locator inside the project tree
    pub package: String,

    /// Local checkout root; rewritten by every runner on receipt
    #[serde(default)]
    pub project_path: PathBuf,

    #[serde(default)]
    pub measurements: Vec<Measurement>,

    /// Sticky: once set the benchmark is skipped for the rest of the run
    #[serde(default)]
    pub failing: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Benchmark {
    /// Creates a benchmark with its name pattern derived from `name`
    pub fn new(name: impl Into<String>, package: impl Into<String>, project_path: &Path) -> Self {
        let name = name.into();
        Self {
            name_pattern: mask_name_to_pattern(&name),
            name,
            package: package.into(),
            project_path: project_path.to_path_buf(),
            measurements: Vec::new(),
            failing: false,
            last_error: None,
        }
    }

    /// The completion record sent once by every runner on the result stream
    pub fn sentinel() -> Self {
        Self {
            name: SENTINEL_NAME.to_string(),
            name_pattern: String::new(),
            package: String::new(),
            project_path: PathBuf::new(),
            measurements: Vec::new(),
            failing: false,
            last_error: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.name == SENTINEL_NAME
    }

    /// Identity used when merging results from different runners
    pub fn identity(&self) -> (&str, &str) {
        (&self.name, &self.package)
    }

    /// Failure transition: the benchmark becomes failing and stays so.
    pub fn on_failure(mut self, error: impl Into<String>) -> Self {
        self.mark_failing(error);
        self
    }

    /// In-place form of [`Benchmark::on_failure`]
    pub fn mark_failing(&mut self, error: impl Into<String>) {
        self.failing = true;
        self.last_error = Some(error.into());
    }

    /// Whether a scheduled occurrence of this benchmark should be executed
    pub fn should_run(&self) -> bool {
        !self.failing
    }

    /// Removes and returns all measurements gathered so far
    pub fn take_measurements(&mut self) -> Vec<Measurement> {
        std::mem::take(&mut self.measurements)
    }

    /// Copy of this benchmark carrying no results, as sent on the job list
    ///
    /// The copy is a fresh job: a failure seen by one runner is local to
    /// that runner and is not handed to others.
    pub fn without_measurements(&self) -> Self {
        Self {
            measurements: Vec::new(),
            failing: false,
            last_error: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(tag: &str) -> Measurement {
        Measurement {
            iterations: 1000,
            ns_per_op: 12.5,
            duration_slot: 1,
            iteration_index: 1,
            suite_run_index: 1,
            repetition_index: 1,
            revision_tag: tag.to_string(),
        }
    }

    #[test]
    fn test_new_derives_pattern() {
        let bench = Benchmark::new("BenchmarkParse/small", "example.com/pkg", Path::new("/tmp"));
        assert_eq!(bench.name_pattern, "^BenchmarkParse$/^small$");
        assert!(bench.should_run());
        assert!(!bench.is_sentinel());
    }

    #[test]
    fn test_sentinel() {
        assert!(Benchmark::sentinel().is_sentinel());
    }

    #[test]
    fn test_failure_is_sticky() {
        let bench = Benchmark::new("BenchmarkA", "pkg", Path::new("/tmp")).on_failure("exit status 1");
        assert!(bench.failing);
        assert!(!bench.should_run());
        assert_eq!(bench.last_error.as_deref(), Some("exit status 1"));

        let mut bench = bench;
        bench.mark_failing("second");
        assert!(bench.failing);
    }

    #[test]
    fn test_take_measurements_clears() {
        let mut bench = Benchmark::new("BenchmarkA", "pkg", Path::new("/tmp"));
        bench.measurements.push(measurement("v1"));
        bench.measurements.push(measurement("v2"));

        let taken = bench.take_measurements();
        assert_eq!(taken.len(), 2);
        assert!(bench.measurements.is_empty());
    }

    #[test]
    fn test_without_measurements_keeps_identity() {
        let mut bench = Benchmark::new("BenchmarkA", "pkg", Path::new("/tmp"));
        bench.measurements.push(measurement("v1"));

        let copy = bench.without_measurements();
        assert_eq!(copy.identity(), bench.identity());
        assert!(copy.measurements.is_empty());
        assert_eq!(bench.measurements.len(), 1);
    }

    #[test]
    fn test_without_measurements_is_a_fresh_job() {
        let bench = Benchmark::new("BenchmarkA", "pkg", Path::new("/tmp")).on_failure("exit status 1");

        let copy = bench.without_measurements();
        assert!(!copy.failing);
        assert!(copy.last_error.is_none());
        assert!(copy.should_run());
        assert!(bench.failing);
    }
}
