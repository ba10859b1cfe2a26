//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Engine::send:
//!     → timeouts.rs (cancellable wait for a concurrency permit)
//!     → timeouts.rs (request deadline over the whole redirect chain)
//! ```
//!
//! # Design Decisions
//! - Every exchange has a deadline
//! - No retries inside the engine; a failed exchange is reported as is
//! - Timeout and cancellation errors are distinct from transport errors

pub mod timeouts;
