//! Client engine subsystem.
//!
//! # Data Flow
//! ```text
//! send(request)
//!     → acquire a concurrency permit
//!     → client.rs: one exchange per hop
//!         → pool hit, or tunnel (connect + TLS)
//!         → write request, parse head, frame body
//!         → release or discard the connection
//!     → redirect.rs: follow 3xx until a final response
//!     → HttpResponse
//! ```

pub mod client;
pub mod redirect;

pub use client::{BatchOutcome, Engine, EngineBuilder};
