//! Connection identity and reuse bookkeeping.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Own the stream together with its read buffer
//! - Decide whether an idle connection may carry another exchange
//!
//! # Design Decisions
//! - A connection has exactly one owner at a time: the pool while idle,
//!   an exchange or a lazy body while in use
//! - Dropping a `Connection` closes the socket

use std::time::{Duration, Instant};

use crate::http::buffer::WireReader;
use crate::net::stream::NetStream;

use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An open connection to a target and the bytes read from it so far.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    key: String,
    reader: WireReader<NetStream>,
    created_at: Instant,
    last_used: Instant,
}

impl Connection {
    /// Wrap a freshly opened stream. `key` is the pool key (`host:port`).
    pub fn new(key: impl Into<String>, stream: NetStream) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            key: key.into(),
            reader: WireReader::new(stream),
            created_at: now,
            last_used: now,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_tls(&self) -> bool {
        self.reader.get_ref().is_tls()
    }

    pub fn reader_mut(&mut self) -> &mut WireReader<NetStream> {
        &mut self.reader
    }

    pub fn stream_mut(&mut self) -> &mut NetStream {
        self.reader.get_mut()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Mark the connection as just used.
    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// Bytes read from the peer but not consumed by an exchange.
    pub fn buffered(&self) -> usize {
        self.reader.buffered()
    }

    /// No leftover bytes and the peer has not closed.
    pub fn is_clean(&self) -> bool {
        self.reader.buffered() == 0 && !self.reader.is_eof()
    }

    /// True if the connection is within its idle and lifetime bounds.
    pub fn is_fresh(&self, idle_timeout: Duration, lifetime: Duration) -> bool {
        self.idle_for() < idle_timeout && self.age() < lifetime
    }

    /// Whether this connection may carry a new exchange to a target whose
    /// TLS-ness is `tls`.
    pub fn is_reusable(&self, idle_timeout: Duration, lifetime: Duration, tls: bool) -> bool {
        self.is_tls() == tls
            && self.is_fresh(idle_timeout, lifetime)
            && self.is_clean()
            && self.reader.get_ref().is_alive()
    }
}
