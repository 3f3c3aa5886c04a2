//! Experiment setup

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The shape of an experiment, fixed for the whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setup {
    /// Benchmark execution duration (BED): seconds measured per benchmark per pass
    pub duration_per_job: u32,
    /// How often each benchmark is scheduled within one suite run (IT)
    pub iterations: u32,
    /// Number of independent suite runs (SR)
    pub suite_runs: u32,
    /// Number of workers expected to report completion (IR)
    pub worker_count: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("{0} must be greater than 0")]
    Zero(&'static str),
}

impl Setup {
    pub fn validate(&self) -> Result<(), SetupError> {
        let fields = [
            ("bed", self.duration_per_job),
            ("iterations", self.iterations),
            ("suite runs", self.suite_runs),
            ("worker count", self.worker_count),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(SetupError::Zero(field));
            }
        }
        Ok(())
    }

    /// Number of benchmark executions a single runner performs
    pub fn executions_per_worker(&self, benchmarks: usize, tags: usize) -> usize {
        benchmarks * tags * self.iterations as usize * self.suite_runs as usize
    }
}

impl std::fmt::Display for Setup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BED = {}, IT = {}, SR = {}, IR = {}",
            self.duration_per_job, self.iterations, self.suite_runs, self.worker_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let setup = Setup {
            duration_per_job: 1,
            iterations: 3,
            suite_runs: 2,
            worker_count: 4,
        };
        assert!(setup.validate().is_ok());
        assert_eq!(setup.executions_per_worker(5, 2), 60);

        let broken = Setup {
            suite_runs: 0,
            ..setup
        };
        assert_eq!(broken.validate(), Err(SetupError::Zero("suite runs")));
    }

    #[test]
    fn test_display() {
        let setup = Setup {
            duration_per_job: 1,
            iterations: 3,
            suite_runs: 2,
            worker_count: 4,
        };
        assert_eq!(setup.to_string(), "BED = 1, IT = 3, SR = 2, IR = 4");
    }
}
