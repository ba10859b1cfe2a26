//! Engine error definitions.
//!
//! Every failure a caller may want to branch on has its own variant. Parsing
//! and framing errors are never retried inside the engine; the connection
//! involved is dropped, never pooled.

use std::time::Duration;
use thiserror::Error;

use crate::http::HttpVersion;

/// Errors that can occur while sending a request.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request asked for a protocol version the engine cannot speak.
    #[error("HTTP/{0} is not supported")]
    UnsupportedProtocolVersion(HttpVersion),

    /// The request cannot be sent as described (bad scheme, missing host).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The engine configuration failed semantic validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The first line of the response is not `HTTP/x.y CODE reason`.
    #[error("Invalid first line of the HTTP response: {0:?}")]
    MalformedStatusLine(String),

    /// The peer closed the connection before sending a status line.
    #[error("Connection closed before a response was received")]
    EmptyResponse,

    /// The header block is incomplete or unreadable.
    #[error("Malformed response headers: {0}")]
    MalformedHeaders(String),

    /// A chunk size line or chunk terminator is invalid.
    #[error("Malformed chunked body: {0}")]
    MalformedChunk(String),

    /// The stream ended before the declared framing was satisfied.
    #[error("Response body truncated ({framing} framing) after {received} bytes")]
    TruncatedBody { framing: &'static str, received: u64 },

    /// A 3xx response arrived without a `Location` header.
    #[error("Status code was {0} but no Location header received. Disable auto redirect and try again")]
    MissingRedirectLocation(u16),

    /// The `Location` header could not be resolved against the request URI.
    #[error("Invalid redirect location {0:?}")]
    InvalidRedirectLocation(String),

    /// More redirects than allowed.
    #[error("Maximum number of redirects ({0}) exceeded")]
    RedirectLimitExceeded(u32),

    /// TLS negotiation with the target failed.
    #[error("Could not authenticate TLS stream with {host}: {source}")]
    TlsHandshakeFailure {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The TLS policy could not be turned into a client configuration.
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// The per-request deadline elapsed.
    #[error("Request timed out after {0:?}")]
    TimedOut(Duration),

    /// No connection to the target could be established.
    #[error("Connection to {target} unavailable: {source}")]
    ConnectionUnavailable {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A batch task ended without producing an outcome (it panicked).
    #[error("Batch task ended without an outcome")]
    TaskFailed,

    /// Read or write failure on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True for errors caused by the response bytes rather than the transport.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            EngineError::MalformedStatusLine(_)
                | EngineError::EmptyResponse
                | EngineError::MalformedHeaders(_)
                | EngineError::MalformedChunk(_)
                | EngineError::TruncatedBody { .. }
                | EngineError::MissingRedirectLocation(_)
                | EngineError::InvalidRedirectLocation(_)
                | EngineError::RedirectLimitExceeded(_)
        )
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
