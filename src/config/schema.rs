//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for an engine instance.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Concurrency and pool capacity limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Redirect policy.
    pub redirects: RedirectConfig,

    /// Response handling.
    pub response: ResponseConfig,

    /// TLS policy applied to every `https` target.
    pub tls: TlsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Concurrency and pool limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum number of requests in flight at once.
    pub max_concurrent_requests: usize,

    /// Maximum idle connections kept per `host:port`.
    pub max_connections_per_server: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 50,
            max_connections_per_server: 200,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Request timeout (whole redirect chain) in milliseconds.
    pub request_ms: u64,

    /// How long a pooled connection may sit idle, in milliseconds.
    pub idle_ms: u64,

    /// Maximum age of a pooled connection regardless of use, in milliseconds.
    pub lifetime_ms: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn lifetime(&self) -> Duration {
        Duration::from_millis(self.lifetime_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            request_ms: 30_000,
            idle_ms: 60_000,
            lifetime_ms: 300_000,
        }
    }
}

/// Redirect policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Follow 3xx responses automatically.
    pub allow_auto_redirect: bool,

    /// Maximum number of redirects followed for a single `send`.
    pub max_redirects: u32,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            allow_auto_redirect: true,
            max_redirects: 8,
        }
    }
}

/// Response handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Materialize the body. When false the body is exposed as a lazy stream
    /// over the connection (headers-only interest).
    pub read_content: bool,

    /// Fixed-length bodies above this size are read into pooled buffers.
    pub pooled_buffer_threshold: usize,

    /// Number of free buffers the shared buffer pool retains.
    pub max_pooled_buffers: usize,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            read_content: true,
            pooled_buffer_threshold: 4096,
            max_pooled_buffers: 64,
        }
    }
}

/// TLS protocol versions the engine can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub enum TlsVersion {
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

/// Certificate revocation checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RevocationMode {
    /// Do not consult revocation lists.
    #[default]
    NoCheck,
    /// Check only the server's end-entity certificate.
    EndEntity,
    /// Check every certificate in the chain.
    FullChain,
}

/// TLS policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Lowest protocol version offered.
    pub min_version: TlsVersion,

    /// Highest protocol version offered.
    pub max_version: TlsVersion,

    /// Cipher suites in preference order (e.g. `TLS_AES_128_GCM_SHA256`).
    /// Empty keeps the provider's default order.
    pub cipher_suites: Vec<String>,

    /// Revocation checking mode.
    pub revocation: RevocationMode,

    /// PEM files with certificate revocation lists.
    pub crl_paths: Vec<String>,

    /// PEM files with additional trust anchors.
    pub extra_root_paths: Vec<String>,

    /// Skip certificate validation entirely.
    pub accept_invalid_certificates: bool,
}

impl TlsConfig {
    /// Cipher order offered by Firefox in late 2020. Suites the TLS provider
    /// does not implement are skipped when the policy is built.
    pub fn firefox_cipher_suites() -> Vec<String> {
        [
            "TLS_AES_128_GCM_SHA256",
            "TLS_CHACHA20_POLY1305_SHA256",
            "TLS_AES_256_GCM_SHA384",
            "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
            "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
            "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
            "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
            "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
            "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
            "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
            "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
            "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
            "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
            "TLS_RSA_WITH_AES_128_GCM_SHA256",
            "TLS_RSA_WITH_AES_256_GCM_SHA384",
            "TLS_RSA_WITH_AES_128_CBC_SHA",
            "TLS_RSA_WITH_AES_256_CBC_SHA",
            "TLS_RSA_WITH_3DES_EDE_CBC_SHA",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: TlsVersion::Tls12,
            max_version: TlsVersion::Tls13,
            cipher_suites: Vec::new(),
            revocation: RevocationMode::NoCheck,
            crl_paths: Vec::new(),
            extra_root_paths: Vec::new(),
            accept_invalid_certificates: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
