//! Transport codec
//!
//! Both orchestrator endpoints speak the same framing: every record is a
//! 4-byte big-endian length followed by that many bytes of JSON encoding one
//! [`Benchmark`].
//!
//! The two directions end differently:
//! - the job list (orchestrator to runner) ends when the orchestrator closes
//!   the connection,
//! - a result stream (runner to orchestrator) ends either with a close after
//!   a partial flush or with the completion sentinel, a record named
//!   [`SENTINEL_NAME`](crate::domain::SENTINEL_NAME).
//!
//! [`RecordReader::next`] reports both endings explicitly through
//! [`StreamEnd`] so callers cannot confuse them.
//!
//! Once a result stream has ended and everything on it is stored, the
//! orchestrator answers with an acknowledgement: 8 bytes, big-endian, the
//! number of measurements it stored from that stream. A stream the
//! orchestrator could not store is closed without one.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::domain::Benchmark;

/// Largest frame body accepted by a reader
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 4;
const ACK_LEN: usize = 8;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream ended inside a frame ({read} of {expected} bytes)")]
    Truncated { read: usize, expected: usize },

    #[error("frame of {0} bytes exceeds the limit of {max} bytes", max = MAX_FRAME_LEN)]
    FrameTooLarge(usize),

    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("completion sentinel received on the benchmark list")]
    UnexpectedSentinel,

    #[error("connection closed without acknowledgement ({read} of {len} bytes)", len = ACK_LEN)]
    MissingAck { read: usize },
}

/// How a record stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The peer sent the completion sentinel
    Sentinel,
    /// The peer closed the connection at a frame boundary
    Closed,
}

/// One decoding step
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Record(Benchmark),
    End(StreamEnd),
}

/// Encodes one record as a complete frame
pub fn encode(record: &Benchmark) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(record)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(body.len()));
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Writes framed records to a byte stream
pub struct RecordWriter<W> {
    inner: W,
    sent: usize,
}

impl<W: AsyncWrite + Unpin> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, sent: 0 }
    }

    pub async fn send(&mut self, record: &Benchmark) -> Result<()> {
        let frame = encode(record)?;
        self.inner.write_all(&frame).await?;
        self.sent += 1;
        Ok(())
    }

    /// Sends the completion sentinel
    pub async fn send_sentinel(&mut self) -> Result<()> {
        self.send(&Benchmark::sentinel()).await
    }

    /// Number of records sent so far, sentinel included
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Flushes and shuts down the write side, signalling a clean close
    pub async fn finish(mut self) -> Result<W> {
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(self.inner)
    }
}

/// Reads framed records from a byte stream
pub struct RecordReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next frame, waiting until one is complete
    pub async fn next(&mut self) -> Result<Frame> {
        let mut header = [0u8; HEADER_LEN];
        let read = self.fill(&mut header).await?;
        if read == 0 {
            return Ok(Frame::End(StreamEnd::Closed));
        }
        if read < HEADER_LEN {
            return Err(CodecError::Truncated {
                read,
                expected: HEADER_LEN,
            });
        }

        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge(len));
        }

        let mut body = vec![0u8; len];
        let read = self.fill(&mut body).await?;
        if read < len {
            return Err(CodecError::Truncated {
                read,
                expected: len,
            });
        }

        let record: Benchmark = serde_json::from_slice(&body)?;
        if record.is_sentinel() {
            return Ok(Frame::End(StreamEnd::Sentinel));
        }
        Ok(Frame::Record(record))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads until `buf` is full or the stream ends, returning the bytes read
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// Acknowledges a result stream after its records were stored
pub async fn send_ack<W: AsyncWrite + Unpin>(writer: &mut W, stored: u64) -> Result<()> {
    writer.write_all(&stored.to_be_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Waits for the acknowledgement of a result stream
///
/// # Returns
/// The number of measurements the orchestrator stored
pub async fn read_ack<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u64> {
    let mut ack = [0u8; ACK_LEN];
    let mut read = 0;
    while read < ACK_LEN {
        let n = reader.read(&mut ack[read..]).await?;
        if n == 0 {
            return Err(CodecError::MissingAck { read });
        }
        read += n;
    }
    Ok(u64::from_be_bytes(ack))
}

/// Reads a whole benchmark list, which ends with the sender closing the stream
pub async fn read_catalog<R: AsyncRead + Unpin>(reader: R) -> Result<Vec<Benchmark>> {
    let mut reader = RecordReader::new(reader);
    let mut benchmarks = Vec::new();

    loop {
        match reader.next().await? {
            Frame::Record(bench) => benchmarks.push(bench),
            Frame::End(StreamEnd::Closed) => return Ok(benchmarks),
            Frame::End(StreamEnd::Sentinel) => return Err(CodecError::UnexpectedSentinel),
        }
    }
}
