//! Benchmark-list endpoint

use benchfleet_core::codec::read_catalog;
use benchfleet_core::domain::Catalog;
use std::path::Path;
use tracing::debug;

use crate::CoordinatorClient;
use crate::error::Result;

impl CoordinatorClient {
    /// Fetch the full benchmark catalog
    ///
    /// Reads records until the orchestrator closes the connection, then
    /// points every benchmark at the local checkout; the path sent by the
    /// orchestrator is not meaningful on this host.
    ///
    /// # Arguments
    /// * `project_path` - Root of the local checkout of the project under test
    pub async fn fetch_catalog(&self, project_path: &Path) -> Result<Catalog> {
        let stream = self.connect(self.list_addr()).await?;
        let benchmarks = read_catalog(stream).await?;

        let mut catalog = Catalog::new(benchmarks);
        catalog.rewrite_project_path(project_path);

        debug!("Fetched {} benchmarks from {}", catalog.len(), self.list_addr());
        Ok(catalog)
    }
}
