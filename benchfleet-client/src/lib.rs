//! Benchfleet Clients
//!
//! Clients for everything a benchfleet process talks to:
//! - [`CoordinatorClient`]: the orchestrator's two TCP endpoints (benchmark
//!   list and result collection)
//! - [`storage`]: object storage for bootstrap artifacts, profiles and logs
//! - [`auth`]: bearer tokens for the Google Cloud REST APIs
//!
//! # Example
//!
//! ```no_run
//! use benchfleet_client::CoordinatorClient;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CoordinatorClient::new("10.0.0.2", 5002, 5003);
//!     let catalog = client.fetch_catalog(Path::new("/tmp/proj")).await?;
//!     println!("Received {} benchmarks", catalog.len());
//!     Ok(())
//! }
//! ```

pub mod auth;
mod catalog;
pub mod error;
mod results;
pub mod storage;

pub use error::{ClientError, Result};

use std::time::Duration;
use tokio::net::TcpStream;

/// Client for the orchestrator's benchmark-list and result endpoints
///
/// Every operation uses a fresh TCP connection; the orchestrator serves each
/// connection independently.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    host: String,
    list_port: u16,
    report_port: u16,
    connect_timeout: Duration,
}

impl CoordinatorClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `host` - Address of the orchestrator
    /// * `list_port` - Port serving the benchmark list
    /// * `report_port` - Port collecting measurements
    pub fn new(host: impl Into<String>, list_port: u16, report_port: u16) -> Self {
        Self {
            host: host.into(),
            list_port,
            report_port,
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Address of the benchmark-list endpoint
    pub fn list_addr(&self) -> String {
        format!("{}:{}", self.host, self.list_port)
    }

    /// Address of the result-collection endpoint
    pub fn report_addr(&self) -> String {
        format!("{}:{}", self.host, self.report_port)
    }

    async fn connect(&self, addr: String) -> Result<TcpStream> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(ClientError::Connect { addr, source }),
            Err(_) => Err(ClientError::ConnectTimeout(addr)),
        }
    }
}
