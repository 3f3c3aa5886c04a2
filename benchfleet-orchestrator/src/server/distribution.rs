//! Job-distribution handler

use benchfleet_core::codec::{self, RecordWriter};
use tokio::net::TcpStream;
use tracing::debug;

use crate::context::ExperimentContext;

/// Writes the whole catalog, without results, then closes the connection
///
/// # Returns
/// The number of records sent
pub async fn handle(ctx: &ExperimentContext, stream: TcpStream) -> codec::Result<usize> {
    let records = ctx.catalog_snapshot();
    let mut writer = RecordWriter::new(stream);

    for record in &records {
        writer.send(record).await?;
    }

    let sent = writer.sent();
    writer.finish().await?;

    debug!("Sent {} benchmarks", sent);
    Ok(sent)
}
