//! Result-collection handler

use anyhow::{Context, Result};
use benchfleet_core::codec::{Frame, RecordReader, StreamEnd, send_ack};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::context::ExperimentContext;

/// Reads result records until the runner closes the stream or signals completion
///
/// Every record is persisted and merged before the next one is read. Once
/// the stream has ended the handler acknowledges the number of stored
/// measurements; on a storage error the connection is dropped without an
/// acknowledgement so the runner does not count the batch as delivered.
pub async fn handle(ctx: &ExperimentContext, stream: TcpStream) -> Result<()> {
    let mut reader = RecordReader::new(stream);
    let mut merged = 0;

    loop {
        match reader.next().await.context("Failed to read result record")? {
            Frame::Record(update) => {
                merged += ctx
                    .ingest(update)
                    .await
                    .context("Failed to store measurements")?;
            }
            Frame::End(StreamEnd::Closed) => {
                debug!("Result stream closed after {} measurements", merged);
                break;
            }
            Frame::End(StreamEnd::Sentinel) => {
                let ordinal = ctx
                    .complete_worker()
                    .await
                    .context("Failed to record worker completion")?;
                info!(
                    "Received completion of worker {} ({} measurements on this stream)",
                    ordinal, merged
                );
                break;
            }
        }
    }

    let mut stream = reader.into_inner();
    send_ack(&mut stream, merged as u64)
        .await
        .context("Failed to acknowledge result stream")?;
    Ok(())
}
