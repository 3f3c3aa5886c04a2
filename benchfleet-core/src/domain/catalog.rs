//! Benchmark catalog
//!
//! The ordered list of benchmarks an experiment runs. The orchestrator keeps
//! one central catalog that accumulates results from every runner; each
//! runner holds its own copy while executing.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::benchmark::Benchmark;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    benchmarks: Vec<Benchmark>,
}

impl Catalog {
    pub fn new(benchmarks: Vec<Benchmark>) -> Self {
        Self { benchmarks }
    }

    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }

    pub fn benchmarks(&self) -> &[Benchmark] {
        &self.benchmarks
    }

    pub fn get(&self, index: usize) -> Option<&Benchmark> {
        self.benchmarks.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Benchmark> {
        self.benchmarks.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Benchmark> {
        self.benchmarks.iter()
    }

    /// Keeps only the benchmarks matching `keep`
    pub fn retain(&mut self, keep: impl FnMut(&Benchmark) -> bool) {
        self.benchmarks.retain(keep);
    }

    /// Merges a result update into the catalog
    ///
    /// Measurements are appended to the benchmark with the same identity.
    /// A failing flag reported by a runner stays with that runner and is not
    /// merged. Updates for unknown benchmarks are added as new entries.
    ///
    /// # Returns
    /// The number of measurements merged
    pub fn merge(&mut self, mut update: Benchmark) -> usize {
        let merged = update.measurements.len();

        match self
            .benchmarks
            .iter_mut()
            .find(|b| b.identity() == update.identity())
        {
            Some(existing) => existing.measurements.append(&mut update.measurements),
            None => {
                update.failing = false;
                update.last_error = None;
                self.benchmarks.push(update);
            }
        }

        merged
    }

    /// Drains the measurements of every benchmark
    ///
    /// # Returns
    /// Copies of the benchmarks that had measurements, each carrying them.
    /// Afterwards no benchmark in the catalog holds any measurement.
    pub fn take_measurements(&mut self) -> Vec<Benchmark> {
        self.benchmarks
            .iter_mut()
            .filter(|b| !b.measurements.is_empty())
            .map(|b| {
                let measurements = b.take_measurements();
                Benchmark {
                    measurements,
                    ..b.clone()
                }
            })
            .collect()
    }

    /// Points every benchmark at the local checkout
    pub fn rewrite_project_path(&mut self, path: &Path) {
        for bench in &mut self.benchmarks {
            bench.project_path = path.to_path_buf();
        }
    }

    /// Copies of all benchmarks without results, as sent on the job list
    pub fn without_measurements(&self) -> Vec<Benchmark> {
        self.benchmarks
            .iter()
            .map(Benchmark::without_measurements)
            .collect()
    }

    pub fn measurement_count(&self) -> usize {
        self.benchmarks.iter().map(|b| b.measurements.len()).sum()
    }
}

impl std::ops::Index<usize> for Catalog {
    type Output = Benchmark;

    fn index(&self, index: usize) -> &Self::Output {
        &self.benchmarks[index]
    }
}

impl std::ops::IndexMut<usize> for Catalog {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.benchmarks[index]
    }
}

impl FromIterator<Benchmark> for Catalog {
    fn from_iter<I: IntoIterator<Item = Benchmark>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Catalog {
    type Item = Benchmark;
    type IntoIter = std::vec::IntoIter<Benchmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.benchmarks.into_iter()
    }
}
