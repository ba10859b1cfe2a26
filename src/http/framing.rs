//! Body framing.
//!
//! # Responsibilities
//! - Decode chunked, fixed-length and read-until-close bodies
//! - Read eager bodies into plain or pooled buffers
//! - Expose lazy bodies as a stream that owns the connection
//!
//! # Design Decisions
//! - `BodyDecoder` is a resumable state machine; every call consumes only
//!   what it returns, so the reader stays positioned for the next exchange
//! - Trailers after the last chunk are skipped, not interpreted
//! - A `BodyStream` hands its connection back to the pool only when the body
//!   was read to the end; dropping it early destroys the connection
//! - Every lazy read is bounded by the request timeout and the caller's
//!   cancellation token, since it runs after `send` has returned

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, EngineResult};
use crate::http::buffer::WireReader;
use crate::http::buffer_pool::BufferPool;
use crate::http::response::ResponseBody;
use crate::net::connection::Connection;
use crate::pool::ConnectionPool;
use crate::resilience::timeouts::with_deadline;

const CRLF: &[u8] = b"\r\n";

// Initial reservation for pooled bodies, whatever Content-Length claims.
const MAX_INITIAL_CAPACITY: usize = 1024 * 1024;

/// How a response body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body (HEAD, 1xx, 204, 304).
    Empty,
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// `Content-Length: N`.
    Length(u64),
    /// Body ends when the peer closes the connection.
    UntilClose,
}

impl Framing {
    pub fn name(&self) -> &'static str {
        match self {
            Framing::Empty => "empty",
            Framing::Chunked => "chunked",
            Framing::Length(_) => "content-length",
            Framing::UntilClose => "until-close",
        }
    }

    /// Whether the connection can carry another exchange after this body.
    pub fn is_reusable(&self) -> bool {
        !matches!(self, Framing::UntilClose)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Length { remaining: u64 },
    ChunkSize,
    ChunkData { remaining: u64 },
    ChunkEnd,
    Trailers,
    UntilClose,
    Done,
}

/// Incremental body decoder.
#[derive(Debug)]
pub struct BodyDecoder {
    framing: Framing,
    state: DecodeState,
    received: u64,
}

impl BodyDecoder {
    pub fn new(framing: Framing) -> Self {
        let state = match framing {
            Framing::Empty | Framing::Length(0) => DecodeState::Done,
            Framing::Length(n) => DecodeState::Length { remaining: n },
            Framing::Chunked => DecodeState::ChunkSize,
            Framing::UntilClose => DecodeState::UntilClose,
        };
        Self {
            framing,
            state,
            received: 0,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Body bytes produced so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn is_done(&self) -> bool {
        self.state == DecodeState::Done
    }

    fn truncated(&self) -> EngineError {
        EngineError::TruncatedBody {
            framing: self.framing.name(),
            received: self.received,
        }
    }

    /// Next piece of body data, or `None` once the body is complete.
    pub async fn next_chunk<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut WireReader<R>,
    ) -> EngineResult<Option<Bytes>> {
        loop {
            match self.state {
                DecodeState::Done => return Ok(None),

                DecodeState::Length { remaining } => {
                    let data = reader
                        .read_up_to(clamp(remaining))
                        .await?
                        .ok_or_else(|| self.truncated())?;
                    let remaining = remaining - data.len() as u64;
                    self.received += data.len() as u64;
                    self.state = if remaining == 0 {
                        DecodeState::Done
                    } else {
                        DecodeState::Length { remaining }
                    };
                    return Ok(Some(data));
                }

                DecodeState::ChunkSize => {
                    let line = reader.read_line().await?.ok_or_else(|| self.truncated())?;
                    let size = parse_chunk_size(&line)?;
                    self.state = if size == 0 {
                        DecodeState::Trailers
                    } else {
                        DecodeState::ChunkData { remaining: size }
                    };
                }

                DecodeState::ChunkData { remaining } => {
                    let data = reader
                        .read_up_to(clamp(remaining))
                        .await?
                        .ok_or_else(|| self.truncated())?;
                    let remaining = remaining - data.len() as u64;
                    self.received += data.len() as u64;
                    self.state = if remaining == 0 {
                        DecodeState::ChunkEnd
                    } else {
                        DecodeState::ChunkData { remaining }
                    };
                    return Ok(Some(data));
                }

                DecodeState::ChunkEnd => {
                    while reader.buffered() < CRLF.len() {
                        if !reader.fill().await? {
                            return Err(self.truncated());
                        }
                    }
                    if !reader.buffer().starts_with(CRLF) {
                        return Err(EngineError::MalformedChunk(
                            "chunk data not followed by CRLF".to_string(),
                        ));
                    }
                    reader.buffer_mut().advance(CRLF.len());
                    self.state = DecodeState::ChunkSize;
                }

                DecodeState::Trailers => {
                    let line = reader.read_line().await?.ok_or_else(|| self.truncated())?;
                    if line.is_empty() {
                        self.state = DecodeState::Done;
                    }
                }

                DecodeState::UntilClose => match reader.read_up_to(usize::MAX).await? {
                    Some(data) => {
                        self.received += data.len() as u64;
                        return Ok(Some(data));
                    }
                    None => self.state = DecodeState::Done,
                },
            }
        }
    }
}

fn clamp(remaining: u64) -> usize {
    usize::try_from(remaining).unwrap_or(usize::MAX)
}

fn parse_chunk_size(line: &[u8]) -> EngineResult<u64> {
    let text = String::from_utf8_lossy(line);
    let size = text.split(';').next().unwrap_or("").trim();
    u64::from_str_radix(size, 16)
        .map_err(|_| EngineError::MalformedChunk(format!("invalid chunk size line {:?}", text)))
}

/// Read a whole body. Fixed-length bodies above the pool threshold go into
/// a buffer rented from `buffers`.
pub async fn read_body<R: AsyncRead + Unpin>(
    reader: &mut WireReader<R>,
    framing: Framing,
    buffers: &BufferPool,
) -> EngineResult<ResponseBody> {
    let mut decoder = BodyDecoder::new(framing);

    match framing {
        Framing::Empty => Ok(ResponseBody::Empty),
        Framing::Length(length) if length > buffers.threshold() as u64 => {
            let mut pooled = buffers.rent(clamp(length).min(MAX_INITIAL_CAPACITY));
            while let Some(data) = decoder.next_chunk(reader).await? {
                pooled.extend_from_slice(&data);
            }
            Ok(ResponseBody::Pooled(pooled))
        }
        _ => {
            let mut body = BytesMut::new();
            while let Some(data) = decoder.next_chunk(reader).await? {
                body.extend_from_slice(&data);
            }
            Ok(ResponseBody::Bytes(body.freeze()))
        }
    }
}

/// A response body read on demand from the connection it arrived on.
#[derive(Debug)]
pub struct BodyStream {
    conn: Option<Connection>,
    decoder: BodyDecoder,
    pool: Option<Arc<ConnectionPool>>,
    read_timeout: Duration,
    cancel: CancellationToken,
}

impl BodyStream {
    /// `pool` is set when the exchange allows the connection to be reused.
    /// Each read waits at most `read_timeout` and stops when `cancel` fires.
    pub(crate) fn new(
        conn: Connection,
        framing: Framing,
        pool: Option<Arc<ConnectionPool>>,
        read_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let mut stream = Self {
            conn: Some(conn),
            decoder: BodyDecoder::new(framing),
            pool,
            read_timeout,
            cancel,
        };
        if stream.decoder.is_done() {
            stream.finish();
        }
        stream
    }

    /// Next piece of body data, or `None` at the end of the body.
    pub async fn next_chunk(&mut self) -> EngineResult<Option<Bytes>> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(None);
        };
        let read = self.decoder.next_chunk(conn.reader_mut());
        match with_deadline(read, self.read_timeout, &self.cancel).await {
            Ok(Some(data)) => Ok(Some(data)),
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(e) => {
                tracing::debug!(error = %e, received = self.decoder.received(), "Dropping connection mid-body");
                self.pool = None;
                self.conn = None;
                Err(e)
            }
        }
    }

    /// Read the rest of the body.
    pub async fn read_to_end(&mut self) -> EngineResult<Bytes> {
        let mut body = BytesMut::new();
        while let Some(data) = self.next_chunk().await? {
            body.extend_from_slice(&data);
        }
        Ok(body.freeze())
    }

    pub fn is_complete(&self) -> bool {
        self.decoder.is_done()
    }

    pub fn received(&self) -> u64 {
        self.decoder.received()
    }

    fn finish(&mut self) {
        let (Some(conn), Some(pool)) = (self.conn.take(), self.pool.take()) else {
            return;
        };
        if conn.is_clean() {
            pool.release(conn);
        } else {
            tracing::warn!(connection_id = %conn.id(), "Discarding connection with unread bytes after body");
        }
    }
}

impl Drop for BodyStream {
    fn drop(&mut self) {
        if self.decoder.is_done() {
            self.finish();
        }
    }
}
