//! Per-connection identity and lifetime tracking.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle::Shutdown;
use crate::net::ConnectionPermit;
use crate::tls::TlsInfo;

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Attached to every request as an extension.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    /// `None` on the plaintext listener.
    pub tls: Option<Arc<TlsInfo>>,
    /// Whether the TLS listener asked this client for a certificate.
    pub client_cert_requested: bool,
    /// Held by everything serving this connection, tunnels included.
    pub lease: Option<ConnectionLease>,
}

impl ConnectionInfo {
    pub fn plaintext(id: ConnectionId, remote_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            local_addr,
            tls: None,
            client_cert_requested: false,
            lease: None,
        }
    }

    pub fn with_lease(mut self, lease: ConnectionLease) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_tls() {
            "https"
        } else {
            "http"
        }
    }
}

/// Counts live connections so shutdown can drain them.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. The guard decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every connection closed, or `timeout` passed. Returns
    /// whether the drain completed.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait = async {
            while self.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Keeps a connection counted by its tracker and holding its listener slot
/// until the last clone is dropped. An upgraded connection outlives its HTTP
/// server task, so the tunnel carries a clone.
#[derive(Clone)]
pub struct ConnectionLease {
    hold: Arc<(ConnectionGuard, Option<ConnectionPermit>)>,
    shutdown: Shutdown,
}

impl ConnectionLease {
    pub fn new(guard: ConnectionGuard, permit: Option<ConnectionPermit>, shutdown: Shutdown) -> Self {
        Self {
            hold: Arc::new((guard, permit)),
            shutdown,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.hold.0.id()
    }

    /// Resolves when the gateway starts shutting down.
    pub async fn shutdown_requested(&self) {
        self.shutdown.wait().await
    }
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("id", &self.id())
            .field("holders", &Arc::strong_count(&self.hold))
            .finish()
    }
}
