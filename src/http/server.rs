//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router around the dispatcher
//! - Wire up middleware (request ID, tracing)
//! - Run the plaintext and TLS accept loops
//! - Serve each connection with upgrade support
//! - Stop accepting on shutdown and drain open connections
//!
//! Backend waits are bounded by the dispatcher, which answers 502 on expiry.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tower::ServiceExt;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::http::dispatcher::Dispatcher;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionInfo, ConnectionLease, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::tls::TlsTerminator;

/// Serves the dispatcher on the gateway listeners.
pub struct GatewayServer {
    router: Router,
    tls: Option<Arc<TlsTerminator>>,
    tracker: ConnectionTracker,
    drain_timeout: Duration,
}

impl GatewayServer {
    pub fn new(dispatcher: Arc<Dispatcher>, tls: Option<Arc<TlsTerminator>>, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(dispatcher),
            tls,
            tracker: ConnectionTracker::new(),
            drain_timeout: request_timeout,
        }
    }

    /// Every path goes to the dispatcher.
    fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(dispatcher)
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept on both listeners until `shutdown`, then drain.
    ///
    /// `https` is ignored when the server has no TLS terminator.
    pub async fn run(self, http: Option<Listener>, https: Option<Listener>, shutdown: Shutdown) {
        let server = Arc::new(self);

        let plain = http.map(|listener| tokio::spawn(Arc::clone(&server).accept_loop(listener, shutdown.clone())));
        let secure = match (https, server.tls.is_some()) {
            (Some(listener), true) => Some(tokio::spawn(Arc::clone(&server).accept_loop(listener, shutdown.clone()))),
            (Some(listener), false) => {
                tracing::warn!(address = ?listener.local_addr().ok(), "TLS listener without certificates, not serving");
                None
            }
            (None, _) => None,
        };

        for task in [plain, secure].into_iter().flatten() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Accept loop panicked");
            }
        }

        tracing::info!(active = server.tracker.active_count(), "Draining connections");
        if !server.tracker.drain(server.drain_timeout).await {
            tracing::warn!(remaining = server.tracker.active_count(), "Drain timed out");
        }
        tracing::info!("Gateway server stopped");
    }

    async fn accept_loop(self: Arc<Self>, listener: Listener, shutdown: Shutdown) {
        let scheme = listener.scheme();
        loop {
            let accepted = tokio::select! {
                _ = shutdown.wait() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, remote_addr, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(scheme, error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };
            let local_addr = match stream.local_addr() {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::debug!(error = %e, "Connection vanished before setup");
                    continue;
                }
            };

            let server = Arc::clone(&self);
            let shutdown = shutdown.clone();
            let tls = if scheme == "https" { self.tls.clone() } else { None };
            tokio::spawn(async move {
                let lease = ConnectionLease::new(server.tracker.track(), Some(permit), shutdown.clone());
                let mut info = ConnectionInfo::plaintext(lease.id(), remote_addr, local_addr).with_lease(lease);

                match tls {
                    Some(terminator) => match terminator.accept(stream).await {
                        Ok((stream, tls_info)) => {
                            metrics::record_session_store_size(terminator.sessions().len());
                            tracing::debug!(
                                connection_id = %info.id,
                                protocol = %tls_info.protocol,
                                cipher = %tls_info.cipher,
                                sni = ?tls_info.sni,
                                "TLS established"
                            );
                            info.tls = Some(Arc::new(tls_info));
                            info.client_cert_requested = terminator.requests_client_certificates();
                            server.serve_connection(stream, info, shutdown).await;
                        }
                        Err(e) => tracing::debug!(connection_id = %info.id, peer_addr = %remote_addr, error = %e, "TLS handshake failed"),
                    },
                    None => server.serve_connection(stream, info, shutdown).await,
                }
            });
        }
        tracing::info!(scheme, "Listener stopped accepting");
    }

    /// Serve HTTP on one established connection, with upgrades.
    pub async fn serve_connection<IO>(&self, io: IO, info: ConnectionInfo, shutdown: Shutdown)
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = info.id;
        let service = self.router.clone().map_request(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(info.clone());
            request
        });

        let builder = auto::Builder::new(TokioExecutor::new());
        let connection = builder.serve_connection_with_upgrades(TokioIo::new(io), TowerToHyperService::new(service));
        tokio::pin!(connection);

        let result = tokio::select! {
            result = connection.as_mut() => result,
            _ = shutdown.wait() => {
                connection.as_mut().graceful_shutdown();
                connection.as_mut().await
            }
        };
        if let Err(e) = result {
            tracing::debug!(connection_id = %id, error = %e, "Connection closed with error");
        }
    }
}

async fn dispatch_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    Extension(info): Extension<ConnectionInfo>,
    request: Request<Body>,
) -> Response {
    dispatcher.dispatch(&info, request).await
}
