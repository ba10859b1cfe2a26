//! Raw HTTP/1.1 client engine.
//!
//! Requests are written byte for byte as described, responses are parsed
//! off the wire with chunked, fixed-length and read-until-close framing,
//! and connections are pooled per `host:port`.

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod net;
pub mod observability;
pub mod pool;
pub mod resilience;

pub use crate::config::EngineConfig;
pub use crate::engine::{BatchOutcome, Engine, EngineBuilder};
pub use crate::error::{EngineError, EngineResult};
pub use crate::http::{HttpRequest, HttpResponse, HttpVersion, RequestBody, ResponseBody};
pub use crate::net::{CertificateCheck, DirectConnector, ProxyConnector};
