//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Engine needs a connection for host:port
//!     → connection_pool.rs (pop front-first, validate, evict stale)
//!     → None → ProxyTunnel opens a new connection
//!
//! Exchange finished cleanly with keep-alive
//!     → connection_pool.rs (purge expired, push back if below capacity)
//! ```
//!
//! # Design Decisions
//! - One queue per `host:port`; no global cap
//! - Oldest connections are checked and evicted first
//! - A connection in use is owned by its exchange, never shared

pub mod connection_pool;

pub use connection_pool::ConnectionPool;
