//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (connection reuse, redirects, discarded connections)
//!     → tracing.rs (one span per send, with an exchange id)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs (fmt subscriber for the binary)
//!     → whatever metrics recorder the application installs
//! ```
//!
//! # Design Decisions
//! - Exchange id flows through every event of a redirect chain
//! - Metrics are cheap (no-ops without a recorder)

pub mod logging;
pub mod metrics;
pub mod tracing;
