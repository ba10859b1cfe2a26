//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Target (host, port, tls)
//!     → connector.rs (direct TCP, or an upstream proxy already tunnelled)
//!     → tls.rs (rustls handshake under the engine's TlsPolicy)
//!     → stream.rs (plain or TLS NetStream)
//!     → connection.rs (identity, read buffer, reuse checks)
//!     → Hand off to the pool or the HTTP layer
//!
//! Connection States:
//!     Connecting → Handshaking → InUse ⇄ Idle (pooled) → Closed
//! ```
//!
//! # Design Decisions
//! - Proxy protocols are a connector concern; the engine only sees a stream
//! - TLS settings are built once per engine
//! - A failed handshake drops the raw socket before the error propagates

pub mod connection;
pub mod connector;
pub mod stream;
pub mod tls;
pub mod tunnel;

pub use connection::{Connection, ConnectionId};
pub use connector::{ConnectFuture, DirectConnector, ProxyConnector};
pub use stream::NetStream;
pub use tls::{CertificateCheck, CertificateValidator, TlsPolicy};
pub use tunnel::ProxyTunnel;
