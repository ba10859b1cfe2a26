//! Outbound TCP connectors.
//!
//! A `ProxyConnector` produces a TCP stream that is already connected to the
//! target, whether directly or through an upstream proxy that has finished
//! its own handshake. Proxy protocol handshakes live in the connector
//! implementation, not in the engine.

use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::pin::Pin;
use tokio::net::TcpStream;

/// Future returned by [`ProxyConnector::connect`].
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send + 'a>>;

/// Capability to open a byte stream to `host:port`.
pub trait ProxyConnector: Send + Sync + Debug {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> ConnectFuture<'a>;
}

/// Connects straight to the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectConnector;

impl ProxyConnector for DirectConnector {
    fn connect<'a>(&'a self, host: &'a str, port: u16) -> ConnectFuture<'a> {
        Box::pin(async move {
            let stream = TcpStream::connect((host, port)).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}
