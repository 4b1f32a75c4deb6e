//! TCP listener with a shared connection budget.
//!
//! The HTTP and HTTPS listeners draw from one semaphore so `max_connections`
//! bounds the gateway as a whole.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid listen address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept: {0}")]
    Accept(std::io::Error),

    #[error("connection limit closed")]
    Closed,
}

/// Connection slots shared by every listener of one gateway.
#[derive(Debug, Clone)]
pub struct ConnectionLimit {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl ConnectionLimit {
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// Accepts connections only while a slot is free.
pub struct Listener {
    inner: TcpListener,
    limit: ConnectionLimit,
    /// `http` or `https`, for logs.
    scheme: &'static str,
}

impl Listener {
    pub async fn bind(address: &str, scheme: &'static str, limit: ConnectionLimit) -> Result<Self, ListenerError> {
        let addr: SocketAddr = address.parse().map_err(|e: std::net::AddrParseError| ListenerError::Address {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        let inner = TcpListener::bind(addr).await.map_err(|source| ListenerError::Bind {
            address: address.to_string(),
            source,
        })?;

        Ok(Self::from_tcp(inner, scheme, limit))
    }

    /// Wrap an already bound listener (tests bind port 0 themselves).
    pub fn from_tcp(inner: TcpListener, scheme: &'static str, limit: ConnectionLimit) -> Self {
        if let Ok(local) = inner.local_addr() {
            tracing::info!(address = %local, scheme, max_connections = limit.max(), "Listener bound");
        }
        Self { inner, limit, scheme }
    }

    /// Wait for a free slot, then accept. The permit must live as long as the connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = Arc::clone(&self.limit.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        tracing::debug!(
            peer_addr = %addr,
            scheme = self.scheme,
            available_permits = self.limit.available(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn scheme(&self) -> &'static str {
        self.scheme
    }
}

/// A held connection slot; released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
