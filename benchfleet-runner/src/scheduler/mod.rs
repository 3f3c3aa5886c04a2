//! Scheduler layer for the runner
//!
//! Fetches the catalog, executes it in randomized order and streams the
//! results back to the orchestrator in batches.

pub mod suite;

pub use suite::{SuiteOptions, SuiteRunner};

use async_trait::async_trait;
use benchfleet_client::{ClientError, CoordinatorClient};
use benchfleet_core::domain::{Benchmark, Catalog};
use std::path::Path;

/// The orchestrator as seen by the scheduler
#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn fetch_catalog(&self, project_path: &Path) -> Result<Catalog, ClientError>;

    /// Reports a batch, returning the number of measurements sent
    async fn report(&self, batch: Vec<Benchmark>) -> Result<usize, ClientError>;

    async fn signal_done(&self) -> Result<(), ClientError>;
}

#[async_trait]
impl Coordinator for CoordinatorClient {
    async fn fetch_catalog(&self, project_path: &Path) -> Result<Catalog, ClientError> {
        CoordinatorClient::fetch_catalog(self, project_path).await
    }

    async fn report(&self, batch: Vec<Benchmark>) -> Result<usize, ClientError> {
        CoordinatorClient::report(self, &batch).await
    }

    async fn signal_done(&self) -> Result<(), ClientError> {
        CoordinatorClient::signal_done(self).await
    }
}
