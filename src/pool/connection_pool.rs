//! Keyed pool of idle connections.
//!
//! # Responsibilities
//! - Keep idle connections per `host:port`
//! - Hand out only connections that pass the reuse checks
//! - Enforce the per-server capacity
//!
//! # Design Decisions
//! - `DashMap` shards the keys so concurrent callers for different targets
//!   do not contend
//! - Invalid connections are dropped on the spot (socket closed)
//! - A release at capacity drops the incoming connection
//! - A target's entry is removed once its last idle connection is taken

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

use crate::net::connection::Connection;
use crate::observability::metrics::{self, PoolEvent};

/// Idle connections grouped by target.
#[derive(Debug)]
pub struct ConnectionPool {
    idle: DashMap<String, VecDeque<Connection>>,
    max_per_server: usize,
    idle_timeout: Duration,
    lifetime: Duration,
}

impl ConnectionPool {
    pub fn new(max_per_server: usize, idle_timeout: Duration, lifetime: Duration) -> Self {
        Self {
            idle: DashMap::new(),
            max_per_server,
            idle_timeout,
            lifetime,
        }
    }

    /// Take a reusable connection for `key`, or `None` if a new one must be
    /// opened.
    pub fn acquire(&self, key: &str, tls: bool) -> Option<Connection> {
        let found = {
            let mut queue = self.idle.get_mut(key)?;
            let mut found = None;
            while let Some(conn) = queue.pop_front() {
                if conn.is_reusable(self.idle_timeout, self.lifetime, tls) {
                    tracing::debug!(connection_id = %conn.id(), key = %key, "Reusing pooled connection");
                    metrics::record_pool_event(PoolEvent::Reused);
                    found = Some(conn);
                    break;
                }
                tracing::trace!(connection_id = %conn.id(), key = %key, "Evicting stale connection");
                metrics::record_pool_event(PoolEvent::Evicted);
            }
            found
        };
        // The shard guard must be gone before removing from the same map.
        self.idle.remove_if(key, |_, queue| queue.is_empty());
        found
    }

    /// Return a connection after a clean exchange.
    pub fn release(&self, mut conn: Connection) {
        let mut queue = self.idle.entry(conn.key().to_string()).or_default();

        while queue
            .front()
            .is_some_and(|c| !c.is_fresh(self.idle_timeout, self.lifetime))
        {
            if let Some(expired) = queue.pop_front() {
                tracing::trace!(connection_id = %expired.id(), "Purging expired connection");
                metrics::record_pool_event(PoolEvent::Evicted);
            }
        }

        if queue.len() >= self.max_per_server {
            tracing::trace!(connection_id = %conn.id(), key = %conn.key(), "Pool full, closing connection");
            metrics::record_pool_event(PoolEvent::Discarded);
            return;
        }

        conn.touch();
        tracing::trace!(connection_id = %conn.id(), key = %conn.key(), idle = queue.len() + 1, "Connection released to pool");
        metrics::record_pool_event(PoolEvent::Released);
        queue.push_back(conn);
    }

    /// Idle connections held for `key`.
    pub fn idle_count(&self, key: &str) -> usize {
        self.idle.get(key).map(|q| q.len()).unwrap_or(0)
    }

    /// Idle connections held across all keys.
    pub fn total_idle(&self) -> usize {
        self.idle.iter().map(|entry| entry.value().len()).sum()
    }

    /// Targets that currently hold idle connections.
    pub fn server_count(&self) -> usize {
        self.idle.len()
    }

    /// Close every idle connection.
    pub fn clear(&self) {
        self.idle.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::stream::NetStream;
    use tokio::net::{TcpListener, TcpStream};

    struct Peer {
        listener: TcpListener,
        sockets: Vec<TcpStream>,
        addr: std::net::SocketAddr,
    }

    impl Peer {
        async fn new() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            Self { listener, sockets: Vec::new(), addr }
        }

        async fn connection(&mut self, key: &str) -> Connection {
            let (client, accepted) = tokio::join!(TcpStream::connect(self.addr), self.listener.accept());
            self.sockets.push(accepted.unwrap().0);
            Connection::new(key, NetStream::Plain(client.unwrap()))
        }
    }

    #[tokio::test]
    async fn release_then_acquire_reuses() {
        let mut peer = Peer::new().await;
        let pool = ConnectionPool::new(4, Duration::from_secs(60), Duration::from_secs(60));
        let conn = peer.connection("a:80").await;
        let id = conn.id();

        pool.release(conn);
        assert_eq!(pool.idle_count("a:80"), 1);
        assert_eq!(pool.total_idle(), 1);

        assert!(pool.acquire("a:80", true).is_none(), "TLS-ness must match");
        assert_eq!(pool.idle_count("a:80"), 0);

        pool.release(peer.connection("a:80").await);
        let reused = pool.acquire("a:80", false).unwrap();
        assert_ne!(reused.id(), id);
        assert!(pool.acquire("a:80", false).is_none());
        assert!(pool.acquire("b:80", false).is_none());
    }

    #[tokio::test]
    async fn drained_targets_leave_the_map() {
        let mut peer = Peer::new().await;
        let pool = ConnectionPool::new(4, Duration::from_secs(60), Duration::from_secs(60));
        for port in 0..16 {
            let key = format!("host-{}:80", port);
            pool.release(peer.connection(&key).await);
            assert!(pool.acquire(&key, false).is_some());
        }
        assert_eq!(pool.server_count(), 0);

        pool.release(peer.connection("a:80").await);
        pool.release(peer.connection("a:80").await);
        pool.release(peer.connection("b:80").await);
        assert!(pool.acquire("a:80", false).is_some());
        assert_eq!(pool.server_count(), 2, "a:80 still holds one connection");

        assert!(pool.acquire("b:80", true).is_none());
        assert_eq!(pool.server_count(), 1, "evicting the last connection drops the entry");
        assert_eq!(pool.idle_count("a:80"), 1);
    }

    #[tokio::test]
    async fn capacity_drops_incoming() {
        let mut peer = Peer::new().await;
        let pool = ConnectionPool::new(2, Duration::from_secs(60), Duration::from_secs(60));
        let first = peer.connection("k").await;
        let first_id = first.id();
        pool.release(first);
        pool.release(peer.connection("k").await);
        pool.release(peer.connection("k").await);
        assert_eq!(pool.idle_count("k"), 2);
        assert_eq!(pool.acquire("k", false).unwrap().id(), first_id);
    }

    #[tokio::test]
    async fn expired_connections_are_not_reused() {
        let mut peer = Peer::new().await;
        let pool = ConnectionPool::new(4, Duration::from_millis(20), Duration::from_secs(60));
        pool.release(peer.connection("k").await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(pool.acquire("k", false).is_none());

        pool.release(peer.connection("k").await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        pool.release(peer.connection("k").await);
        assert_eq!(pool.idle_count("k"), 1, "expired front entry is purged on release");

        pool.clear();
        assert_eq!(pool.total_idle(), 0);
    }
}
