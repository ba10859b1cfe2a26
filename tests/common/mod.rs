//! Shared utilities for integration testing: scripted HTTP/1.1 servers on
//! loopback (plain or TLS with a self-signed certificate) and a connector
//! that maps host names onto them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use rawhttp::net::{ConnectFuture, ProxyConnector};

/// A request as the mock server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Index of the connection (in accept order) the request arrived on.
    pub connection: usize,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn path(&self) -> &str {
        self.request_line.split(' ').nth(1).unwrap_or("")
    }

    pub fn method(&self) -> &str {
        self.request_line.split(' ').next().unwrap_or("")
    }
}

/// What the server does with one request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub bytes: Vec<u8>,
    pub close: bool,
    pub delay: Duration,
}

impl Reply {
    /// Write `bytes` and wait for the next request on the same connection.
    pub fn keep_alive(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            close: false,
            delay: Duration::ZERO,
        }
    }

    /// Write `bytes` and close the connection.
    pub fn close(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            close: true,
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// `HTTP/1.1 <status>` with the given headers and a Content-Length body.
pub fn response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\n", status);
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

pub fn ok(body: &str) -> Vec<u8> {
    response("200 OK", &[], body.as_bytes())
}

pub fn redirect(status: &str, location: &str) -> Vec<u8> {
    response(status, &[("Location", location)], b"")
}

type Handler = dyn Fn(&RecordedRequest) -> Reply + Send + Sync;

/// Scripted HTTP/1.1 server on `127.0.0.1:0`.
#[derive(Clone)]
pub struct MockServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        Self::listen(handler, None).await
    }

    /// Same as [`MockServer::start`], behind TLS with `identity`'s
    /// certificate.
    pub async fn start_tls<F>(identity: &TlsIdentity, handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        Self::listen(handler, Some(identity.acceptor())).await
    }

    async fn listen<F>(handler: F, tls: Option<TlsAcceptor>) -> Self
    where
        F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Self {
            addr: listener.local_addr().unwrap(),
            connections: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let handler: Arc<Handler> = Arc::new(handler);

        let state = server.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let index = state.connections.fetch_add(1, Ordering::SeqCst);
                let state = state.clone();
                let handler = Arc::clone(&handler);
                let tls = tls.clone();
                tokio::spawn(async move {
                    match tls {
                        None => state.serve(socket, index, handler).await,
                        Some(acceptor) => {
                            if let Ok(stream) = acceptor.accept(socket).await {
                                state.serve(stream, index, handler).await;
                            }
                        }
                    }
                });
            }
        });

        server
    }

    /// Server that answers every request with `reply`.
    pub async fn always(reply: Reply) -> Self {
        Self::start(move |_| reply.clone()).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.addr.port(), path)
    }

    /// Pool key the engine uses for this server.
    pub fn key(&self) -> String {
        format!("127.0.0.1:{}", self.addr.port())
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    async fn serve<S>(&self, mut socket: S, connection: usize, handler: Arc<Handler>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            let Some(request) = read_request(&mut socket, &mut buf, connection).await else {
                return;
            };

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());

            let reply = handler(&request);
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if socket.write_all(&reply.bytes).await.is_err() {
                return;
            }
            if reply.close {
                let _ = socket.shutdown().await;
                return;
            }
        }
    }
}

async fn read_request<S>(socket: &mut S, buf: &mut Vec<u8>, connection: usize) -> Option<RecordedRequest>
where
    S: AsyncRead + Unpin,
{
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        fill(socket, buf).await?;
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    buf.drain(..head_end + 4);

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("").to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < length {
        fill(socket, buf).await?;
    }
    let body: Vec<u8> = buf.drain(..length).collect();

    Some(RecordedRequest {
        request_line,
        headers,
        body,
        connection,
    })
}

async fn fill<S: AsyncRead + Unpin>(socket: &mut S, buf: &mut Vec<u8>) -> Option<()> {
    let mut chunk = [0u8; 4096];
    match socket.read(&mut chunk).await {
        Ok(0) | Err(_) => None,
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            Some(())
        }
    }
}

/// A self-signed server certificate and its key.
pub struct TlsIdentity {
    cert: CertificateDer<'static>,
    key: Vec<u8>,
    pem: String,
}

impl TlsIdentity {
    /// Certificate valid for `host`, signed by its own key.
    pub fn self_signed(host: &str) -> Self {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec![host.to_string()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();
        Self {
            cert: cert.der().clone(),
            key: key_pair.serialize_der(),
            pem: cert.pem(),
        }
    }

    /// Write the certificate as PEM so it can be configured as a trust root.
    pub fn write_pem(&self) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("rawhttp-root-{}.pem", uuid::Uuid::new_v4()));
        std::fs::write(&path, &self.pem).unwrap();
        path
    }

    fn acceptor(&self) -> TlsAcceptor {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.clone()));
        let config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![self.cert.clone()], key)
            .unwrap();
        TlsAcceptor::from(Arc::new(config))
    }
}

/// Routes host names to local listeners, ignoring the port.
#[derive(Debug, Default)]
pub struct MappedConnector {
    routes: HashMap<String, SocketAddr>,
}

impl MappedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, host: &str, addr: SocketAddr) -> Self {
        self.routes.insert(host.to_string(), addr);
        self
    }
}

impl ProxyConnector for MappedConnector {
    fn connect<'a>(&'a self, host: &'a str, _port: u16) -> ConnectFuture<'a> {
        Box::pin(async move {
            let addr = self.routes.get(host).copied().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no route for {}", host))
            })?;
            TcpStream::connect(addr).await
        })
    }
}
