//! Request orchestration.
//!
//! # Responsibilities
//! - Bound the number of requests in flight
//! - Drive one exchange per redirect hop: write, parse, release or discard
//! - Follow redirects and report the final response
//!
//! # Design Decisions
//! - One permit covers the whole redirect chain of a `send`
//! - A connection goes back to the pool only after a complete exchange that
//!   both sides allow to be kept alive; every error path drops it
//! - The engine owns its pool, buffer pool, limiter and TLS policy; there is
//!   no process-wide client state

use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::validation::{describe, validate_config};
use crate::config::EngineConfig;
use crate::engine::redirect::{apply_redirect, redirect_location};
use crate::error::{EngineError, EngineResult};
use crate::http::buffer_pool::BufferPool;
use crate::http::compression::decode_body;
use crate::http::framing::{read_body, BodyStream};
use crate::http::parser::{has_token, read_head, ResponseHead};
use crate::http::request::{EncodedBody, HttpRequest, HttpVersion, Target};
use crate::http::response::{HttpResponse, ResponseBody};
use crate::http::writer::write_request;
use crate::net::connection::Connection;
use crate::net::connector::{DirectConnector, ProxyConnector};
use crate::net::tls::{CertificateCheck, CertificateValidator, TlsPolicy};
use crate::net::tunnel::ProxyTunnel;
use crate::observability::metrics::{self, PoolEvent};
use crate::observability::tracing::exchange_span;
use crate::pool::ConnectionPool;
use crate::resilience::timeouts::{cancellable, with_deadline};

/// HTTP/1.1 client engine. Cheap to clone; clones share everything.
#[derive(Debug, Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    config: EngineConfig,
    limiter: Arc<Semaphore>,
    pool: Arc<ConnectionPool>,
    tunnel: ProxyTunnel,
    buffers: BufferPool,
}

/// Builds an [`Engine`] with a custom connector or certificate validator.
pub struct EngineBuilder {
    config: EngineConfig,
    connector: Option<Arc<dyn ProxyConnector>>,
    validator: Option<CertificateValidator>,
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("connector", &self.connector)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl EngineBuilder {
    /// Route every connection through `connector` (e.g. an upstream proxy).
    pub fn connector(mut self, connector: Arc<dyn ProxyConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Decide certificate acceptance. The check carries the default verdict.
    pub fn certificate_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&CertificateCheck<'_>) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn build(self) -> EngineResult<Engine> {
        let config = self.config;
        validate_config(&config).map_err(|errors| EngineError::InvalidConfig(describe(&errors)))?;

        let policy = TlsPolicy::from_config(&config.tls, self.validator)?;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(DirectConnector) as Arc<dyn ProxyConnector>);
        let tunnel = ProxyTunnel::new(connector, &policy, config.timeouts.connect());
        let pool = Arc::new(ConnectionPool::new(
            config.limits.max_connections_per_server,
            config.timeouts.idle(),
            config.timeouts.lifetime(),
        ));
        let buffers = BufferPool::new(
            config.response.max_pooled_buffers,
            config.response.pooled_buffer_threshold,
        );
        let limiter = Arc::new(Semaphore::new(config.limits.max_concurrent_requests));

        tracing::debug!(
            max_concurrent_requests = config.limits.max_concurrent_requests,
            max_connections_per_server = config.limits.max_connections_per_server,
            "Engine created"
        );

        Ok(Engine {
            inner: Arc::new(EngineInner {
                config,
                limiter,
                pool,
                tunnel,
                buffers,
            }),
        })
    }
}

/// Result of one request of a batch, with the request handed back.
#[derive(Debug)]
pub struct BatchOutcome {
    pub request: HttpRequest,
    pub result: EngineResult<HttpResponse>,
}

// One request/response on one connection.
struct Exchange {
    head: ResponseHead,
    body: ResponseBody,
    raw_request: Bytes,
    decompression_failed: bool,
}

impl Engine {
    /// Engine with direct connections.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            connector: None,
            validator: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.inner.buffers
    }

    /// Requests that can start right now without waiting.
    pub fn available_permits(&self) -> usize {
        self.inner.limiter.available_permits()
    }

    /// Send `request`, following redirects if enabled.
    ///
    /// Redirects rewrite `request` in place, so afterwards it describes the
    /// last hop (method, URI, headers, cookies).
    pub async fn send(&self, request: &mut HttpRequest, cancel: &CancellationToken) -> EngineResult<HttpResponse> {
        let (span, _) = exchange_span(request.method.as_str(), request.uri.as_str());
        async {
            let start = Instant::now();
            let _permit = cancellable(self.inner.limiter.acquire(), cancel)
                .await?
                .map_err(|_| EngineError::Cancelled)?;

            let timeout = self.inner.config.timeouts.request();
            let result = with_deadline(self.follow_redirects(request, cancel), timeout, cancel).await;
            match &result {
                Ok(response) => {
                    metrics::record_exchange(response.method.as_str(), response.status.as_u16(), start);
                }
                Err(e) => tracing::debug!(error = %e, "Request failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Send every request concurrently, at most `max_concurrency` at a time
    /// on top of the engine limit. Outcomes come back in input order, one
    /// per request; a task that panics yields `TaskFailed` with the request
    /// as it was submitted.
    pub async fn send_batch(
        &self,
        requests: Vec<HttpRequest>,
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<BatchOutcome> {
        let limiter = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let submitted = requests.clone();
        let mut tasks = JoinSet::new();

        for (index, mut request) in requests.into_iter().enumerate() {
            let engine = self.clone();
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = match cancellable(limiter.acquire_owned(), &cancel).await {
                    Ok(Ok(_permit)) => engine.send(&mut request, &cancel).await,
                    Ok(Err(_)) | Err(_) => Err(EngineError::Cancelled),
                };
                (index, BatchOutcome { request, result })
            });
        }

        let mut slots: Vec<Option<BatchOutcome>> = submitted.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => tracing::error!(error = %e, "Batch task failed"),
            }
        }

        slots
            .into_iter()
            .zip(submitted)
            .map(|(slot, request)| {
                slot.unwrap_or(BatchOutcome {
                    request,
                    result: Err(EngineError::TaskFailed),
                })
            })
            .collect()
    }

    async fn follow_redirects(
        &self,
        request: &mut HttpRequest,
        cancel: &CancellationToken,
    ) -> EngineResult<HttpResponse> {
        let redirect_config = &self.inner.config.redirects;
        let mut redirects = 0u32;

        loop {
            let exchange = self.exchange(request, cancel).await?;

            if exchange.head.status.is_redirection() && redirect_config.allow_auto_redirect {
                let location = redirect_location(&exchange.head, &request.uri)?;
                if redirects >= redirect_config.max_redirects {
                    return Err(EngineError::RedirectLimitExceeded(redirect_config.max_redirects));
                }
                tracing::debug!(
                    status = exchange.head.status.as_u16(),
                    from = %request.uri,
                    to = %location,
                    "Following redirect"
                );
                let status = exchange.head.status;
                drop(exchange);
                apply_redirect(request, status, location);
                redirects += 1;
                metrics::record_redirect();
                continue;
            }

            let Exchange {
                head,
                body,
                raw_request,
                decompression_failed,
            } = exchange;
            return Ok(HttpResponse {
                version: head.version,
                status: head.status,
                reason: head.reason,
                headers: head.headers,
                content_headers: head.content_headers,
                body,
                uri: request.uri.clone(),
                method: request.method.clone(),
                raw_request,
                decompression_failed,
                redirects,
            });
        }
    }

    async fn exchange(&self, request: &mut HttpRequest, cancel: &CancellationToken) -> EngineResult<Exchange> {
        let target = Target::from_uri(&request.uri)?;

        let body = match &request.body {
            Some(body) => Some(EncodedBody::encode(body).await?),
            None => None,
        };
        let mut wire = BytesMut::new();
        write_request(request, body.as_ref(), &mut wire)?;
        let raw_request = wire.freeze();

        let mut conn = self.checkout(&target).await?;
        conn.stream_mut().write_all(&raw_request).await?;
        conn.stream_mut().flush().await?;

        let head = read_head(conn.reader_mut(), &mut request.cookies, &target.host).await?;
        let framing = head.framing(&request.method);
        let keep_alive = framing.is_reusable() && request_allows_keep_alive(request) && head.allows_keep_alive();

        if !self.inner.config.response.read_content {
            let pool = keep_alive.then(|| Arc::clone(&self.inner.pool));
            let stream = BodyStream::new(
                conn,
                framing,
                pool,
                self.inner.config.timeouts.request(),
                cancel.child_token(),
            );
            return Ok(Exchange {
                head,
                body: ResponseBody::Stream(stream),
                raw_request,
                decompression_failed: false,
            });
        }

        let body = read_body(conn.reader_mut(), framing, &self.inner.buffers).await?;
        self.finish_connection(conn, keep_alive);

        let (body, decompression_failed) = decompress(body, head.content_headers.get("Content-Encoding"));
        Ok(Exchange {
            head,
            body,
            raw_request,
            decompression_failed,
        })
    }

    async fn checkout(&self, target: &Target) -> EngineResult<Connection> {
        let key = target.key();
        if let Some(conn) = self.inner.pool.acquire(&key, target.tls) {
            return Ok(conn);
        }
        let stream = self.inner.tunnel.open(target).await?;
        let conn = Connection::new(key, stream);
        tracing::debug!(connection_id = %conn.id(), key = %conn.key(), tls = target.tls, "Opened new connection");
        metrics::record_pool_event(PoolEvent::Opened);
        Ok(conn)
    }

    fn finish_connection(&self, conn: Connection, keep_alive: bool) {
        if !keep_alive {
            tracing::trace!(connection_id = %conn.id(), "Closing connection after exchange");
            metrics::record_pool_event(PoolEvent::Discarded);
            return;
        }
        if !conn.is_clean() {
            tracing::warn!(
                connection_id = %conn.id(),
                leftover = conn.buffered(),
                "Discarding connection with unread bytes after response"
            );
            metrics::record_pool_event(PoolEvent::Discarded);
            return;
        }
        self.inner.pool.release(conn);
    }
}

/// The request allows keep-alive only if it declared a `Connection` header
/// that does not say `close` (otherwise `Connection: Close` was sent).
fn request_allows_keep_alive(request: &HttpRequest) -> bool {
    match request.headers.get("Connection") {
        None => false,
        Some("") => request.version >= HttpVersion::HTTP_11,
        Some(value) if has_token(value, "close") => false,
        Some(value) if has_token(value, "keep-alive") => true,
        Some(_) => request.version >= HttpVersion::HTTP_11,
    }
}

/// Undo `Content-Encoding` on an in-memory body.
fn decompress(body: ResponseBody, encoding: Option<&str>) -> (ResponseBody, bool) {
    let Some(encoding) = encoding else {
        return (body, false);
    };
    let raw = match &body {
        ResponseBody::Bytes(bytes) if !bytes.is_empty() => bytes.clone(),
        ResponseBody::Pooled(buf) if !buf.is_empty() => Bytes::copy_from_slice(buf),
        _ => return (body, false),
    };
    let decoded = decode_body(Some(encoding), raw);
    if decoded.failed {
        (body, true)
    } else {
        (ResponseBody::Bytes(decoded.data), false)
    }
}
