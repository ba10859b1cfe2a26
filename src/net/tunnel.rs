//! Stream establishment through a connector, with optional TLS upgrade.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use crate::error::{EngineError, EngineResult};
use crate::http::request::Target;
use crate::net::connector::ProxyConnector;
use crate::net::stream::NetStream;
use crate::net::tls::TlsPolicy;

/// Opens streams to targets for one engine.
#[derive(Debug, Clone)]
pub struct ProxyTunnel {
    connector: Arc<dyn ProxyConnector>,
    tls: TlsConnectorHandle,
    connect_timeout: Duration,
}

#[derive(Clone)]
struct TlsConnectorHandle(TlsConnector);

impl std::fmt::Debug for TlsConnectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TlsConnector")
    }
}

impl ProxyTunnel {
    pub fn new(connector: Arc<dyn ProxyConnector>, policy: &TlsPolicy, connect_timeout: Duration) -> Self {
        Self {
            connector,
            tls: TlsConnectorHandle(policy.connector()),
            connect_timeout,
        }
    }

    /// Connect to `target`, upgrading to TLS for `https` targets.
    ///
    /// The connect step is bounded by the connect timeout; the handshake is
    /// bounded by the caller's deadline.
    pub async fn open(&self, target: &Target) -> EngineResult<NetStream> {
        let unavailable = |source: io::Error| EngineError::ConnectionUnavailable {
            target: target.key(),
            source,
        };

        let tcp = match tokio::time::timeout(
            self.connect_timeout,
            self.connector.connect(&target.host, target.port),
        )
        .await
        {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(e)) => return Err(unavailable(e)),
            Err(_) => {
                return Err(unavailable(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.connect_timeout),
                )))
            }
        };

        if !target.tls {
            tracing::debug!(target = %target.key(), "Opened plain connection");
            return Ok(NetStream::Plain(tcp));
        }

        let handshake_failure = |source: io::Error| EngineError::TlsHandshakeFailure {
            host: target.host.clone(),
            source,
        };
        let server_name = ServerName::try_from(target.host.clone())
            .map_err(|e| handshake_failure(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        let tls = self
            .tls
            .0
            .connect(server_name, tcp)
            .await
            .map_err(handshake_failure)?;
        tracing::debug!(target = %target.key(), "Opened TLS connection");
        Ok(NetStream::Tls(Box::new(tls)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsConfig;
    use crate::net::connector::DirectConnector;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn tunnel(timeout: Duration) -> ProxyTunnel {
        let policy = TlsPolicy::from_config(&TlsConfig::default(), None).unwrap();
        ProxyTunnel::new(Arc::new(DirectConnector), &policy, timeout)
    }

    #[tokio::test]
    async fn plain_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = Target { host: "127.0.0.1".into(), port, tls: false };
        let t = tunnel(Duration::from_secs(5));
        let (stream, _) = tokio::join!(t.open(&target), listener.accept());
        assert!(!stream.unwrap().is_tls());
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let target = Target { host: "127.0.0.1".into(), port, tls: false };
        let err = tunnel(Duration::from_secs(5)).open(&target).await.unwrap_err();
        assert!(matches!(err, EngineError::ConnectionUnavailable { .. }));
    }

    #[tokio::test]
    async fn handshake_against_plain_server_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        });
        let target = Target { host: "localhost".into(), port, tls: true };
        let err = tunnel(Duration::from_secs(5)).open(&target).await.unwrap_err();
        assert!(matches!(err, EngineError::TlsHandshakeFailure { ref host, .. } if host == "localhost"));
        server.await.unwrap();
    }
}
