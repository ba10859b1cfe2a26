//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, timeouts > 0)
//! - Check TLS version bounds are ordered
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before an engine is constructed from the config

use crate::config::schema::EngineConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Human readable description.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate an engine configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut check = |ok: bool, field: &'static str, message: &str| {
        if !ok {
            errors.push(ValidationError {
                field,
                message: message.to_string(),
            });
        }
    };

    check(
        config.limits.max_concurrent_requests > 0,
        "limits.max_concurrent_requests",
        "must be greater than 0",
    );
    check(
        config.limits.max_connections_per_server > 0,
        "limits.max_connections_per_server",
        "must be greater than 0",
    );
    check(config.timeouts.connect_ms > 0, "timeouts.connect_ms", "must be greater than 0");
    check(config.timeouts.request_ms > 0, "timeouts.request_ms", "must be greater than 0");
    check(config.timeouts.idle_ms > 0, "timeouts.idle_ms", "must be greater than 0");
    check(config.timeouts.lifetime_ms > 0, "timeouts.lifetime_ms", "must be greater than 0");
    check(
        config.tls.min_version <= config.tls.max_version,
        "tls.min_version",
        "must not be greater than tls.max_version",
    );
    check(
        config.response.pooled_buffer_threshold > 0,
        "response.pooled_buffer_threshold",
        "must be greater than 0",
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Join validation errors into a single message.
pub fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
