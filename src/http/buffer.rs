//! Incremental read buffering.
//!
//! # Responsibilities
//! - Keep every byte read from the socket until the parser consumes it
//! - Search for delimiters across read boundaries
//! - Hand out consumed ranges without copying when they sit in one read
//!
//! # Design Decisions
//! - Each socket read becomes one `Bytes` segment; searches use a fast path
//!   when the data sits in a single segment and a boundary-aware path when it
//!   spans several
//! - The reader never discards unconsumed data, so a parse step that needs
//!   more input simply fills and retries

use bytes::{Bytes, BytesMut};
use memchr::memmem;
use std::collections::VecDeque;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const CRLF: &[u8] = b"\r\n";
const DEFAULT_READ_SIZE: usize = 8 * 1024;

/// Buffered bytes stored as the sequence of reads that produced them.
#[derive(Debug, Default)]
pub struct SegmentedBuf {
    segments: VecDeque<Bytes>,
    len: usize,
}

impl SegmentedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Bytes) {
        if !segment.is_empty() {
            self.len += segment.len();
            self.segments.push_back(segment);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        if self.len < prefix.len() {
            return false;
        }
        self.segments
            .iter()
            .flat_map(|s| s.iter())
            .zip(prefix)
            .all(|(a, b)| a == b)
    }

    /// Offset of the first occurrence of `needle`.
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        match self.segments.len() {
            0 => None,
            1 => memmem::find(&self.segments[0], needle),
            _ => self.find_segmented(needle),
        }
    }

    // A match that straddles segments starts within the last `needle.len() - 1`
    // bytes seen before the current segment, so only that tail is carried.
    fn find_segmented(&self, needle: &[u8]) -> Option<usize> {
        let tail = needle.len() - 1;
        let mut carry: Vec<u8> = Vec::with_capacity(tail);
        let mut offset = 0usize;

        for segment in &self.segments {
            if !carry.is_empty() {
                let head = &segment[..segment.len().min(tail)];
                let mut joined = Vec::with_capacity(carry.len() + head.len());
                joined.extend_from_slice(&carry);
                joined.extend_from_slice(head);
                if let Some(pos) = memmem::find(&joined, needle) {
                    return Some(offset - carry.len() + pos);
                }
            }

            if let Some(pos) = memmem::find(segment, needle) {
                return Some(offset + pos);
            }

            if segment.len() >= tail {
                carry.clear();
                carry.extend_from_slice(&segment[segment.len() - tail..]);
            } else {
                carry.extend_from_slice(segment);
                let excess = carry.len().saturating_sub(tail);
                carry.drain(..excess);
            }
            offset += segment.len();
        }
        None
    }

    /// Remove and return the first `n` bytes. Panics if `n > len`.
    pub fn split_to(&mut self, n: usize) -> Bytes {
        assert!(n <= self.len, "split_to out of bounds: {} > {}", n, self.len);
        if n == 0 {
            return Bytes::new();
        }
        self.len -= n;

        if let Some(front) = self.segments.front_mut() {
            if front.len() >= n {
                let out = front.split_to(n);
                if front.is_empty() {
                    self.segments.pop_front();
                }
                return out;
            }
        }

        let mut out = BytesMut::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let Some(mut front) = self.segments.pop_front() else { break };
            if front.len() > remaining {
                out.extend_from_slice(&front.split_to(remaining));
                self.segments.push_front(front);
                remaining = 0;
            } else {
                remaining -= front.len();
                out.extend_from_slice(&front);
            }
        }
        out.freeze()
    }

    /// Drop the first `n` bytes.
    pub fn advance(&mut self, n: usize) {
        let _ = self.split_to(n);
    }

    /// Take the first segment, or at most `max` bytes of it.
    pub fn take_front(&mut self, max: usize) -> Option<Bytes> {
        let front_len = self.segments.front()?.len();
        Some(self.split_to(front_len.min(max)))
    }
}

/// A buffered reader over a connection that keeps unconsumed bytes.
#[derive(Debug)]
pub struct WireReader<R> {
    io: R,
    buf: SegmentedBuf,
    eof: bool,
    read_size: usize,
}

impl<R> WireReader<R> {
    pub fn new(io: R) -> Self {
        Self {
            io,
            buf: SegmentedBuf::new(),
            eof: false,
            read_size: DEFAULT_READ_SIZE,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.io
    }

    /// Underlying stream, e.g. for writing a request.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.io
    }

    /// Bytes read but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn buffer(&self) -> &SegmentedBuf {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut SegmentedBuf {
        &mut self.buf
    }

    /// True once the peer closed its side.
    pub fn is_eof(&self) -> bool {
        self.eof
    }
}

impl<R: AsyncRead + Unpin> WireReader<R> {
    /// Read one more segment. Returns false once the peer has closed.
    pub async fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let mut chunk = BytesMut::with_capacity(self.read_size);
        let n = self.io.read_buf(&mut chunk).await?;
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.buf.push(chunk.freeze());
        Ok(true)
    }

    /// Read a line without its CRLF. `None` if the stream ends first.
    pub async fn read_line(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if let Some(pos) = self.buf.find(CRLF) {
                let line = self.buf.split_to(pos);
                self.buf.advance(CRLF.len());
                return Ok(Some(line));
            }
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    /// Consume up to `max` bytes, reading if nothing is buffered. `None` at
    /// end of stream.
    pub async fn read_up_to(&mut self, max: usize) -> io::Result<Option<Bytes>> {
        if max == 0 {
            return Ok(Some(Bytes::new()));
        }
        if self.buf.is_empty() && !self.fill().await? {
            return Ok(None);
        }
        Ok(self.buf.take_front(max))
    }
}
