//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → owned by one Engine instance
//! ```
//!
//! # Design Decisions
//! - Config is fixed per engine; a different config means a new engine
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::EngineConfig;
pub use schema::LimitsConfig;
pub use schema::TimeoutConfig;
pub use schema::RedirectConfig;
pub use schema::ResponseConfig;
pub use schema::TlsConfig;
pub use schema::{RevocationMode, TlsVersion};
pub use schema::ObservabilityConfig;
