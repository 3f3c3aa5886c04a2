//! Result-collection endpoint

use benchfleet_core::codec::{RecordWriter, read_ack};
use benchfleet_core::domain::Benchmark;
use tracing::debug;

use crate::CoordinatorClient;
use crate::error::{ClientError, Result};

impl CoordinatorClient {
    /// Stream measurements to the orchestrator on a fresh connection
    ///
    /// Returns once the orchestrator has acknowledged storing the whole
    /// stream. A batch the orchestrator could not store is an error.
    ///
    /// # Arguments
    /// * `benchmarks` - Benchmarks carrying the measurements to report
    ///
    /// # Returns
    /// The number of measurements sent
    pub async fn report(&self, benchmarks: &[Benchmark]) -> Result<usize> {
        let mut stream = self.connect(self.report_addr()).await?;

        let mut writer = RecordWriter::new(&mut stream);
        for bench in benchmarks {
            writer.send(bench).await?;
        }
        writer.finish().await?;
        let stored = read_ack(&mut stream).await?;

        let measurements: usize = benchmarks.iter().map(|b| b.measurements.len()).sum();
        if stored != measurements as u64 {
            return Err(ClientError::Unacknowledged {
                sent: measurements,
                stored,
            });
        }
        debug!(
            "Reported {} measurements for {} benchmarks",
            measurements,
            benchmarks.len()
        );
        Ok(measurements)
    }

    /// Tell the orchestrator this runner has finished
    ///
    /// Must be sent exactly once per runner, after the last report.
    pub async fn signal_done(&self) -> Result<()> {
        let mut stream = self.connect(self.report_addr()).await?;

        let mut writer = RecordWriter::new(&mut stream);
        writer.send_sentinel().await?;
        writer.finish().await?;
        read_ack(&mut stream).await?;

        debug!("Sent completion signal to {}", self.report_addr());
        Ok(())
    }
}
