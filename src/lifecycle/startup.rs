//! Startup orchestration.
//!
//! # Order
//! 1. TLS terminator (chain, key, cipher policy, OCSP stapler, session store)
//! 2. Token issuer for the client-certificate flow
//! 3. Route table (first load is fatal), then the file watcher
//! 4. Forwarder, dispatcher, server
//! 5. Listeners, last, so traffic only arrives once everything is ready
//!
//! Any failure before step 5 completes aborts startup.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::RecommendedWatcher;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::admin::{setup_admin_router, AdminState};
use crate::auth::{ClientCertAuth, TokenIssuer};
use crate::config::{GatewayConfig, RoutesWatcher};
use crate::error::GatewayError;
use crate::http::{Dispatcher, GatewayServer, HyperForwarder};
use crate::lifecycle::{signals, Shutdown};
use crate::net::{ConnectionLimit, Listener};
use crate::routing::RouteTableHandle;
use crate::tls::TlsTerminator;

/// A fully initialized gateway with bound listeners.
pub struct Gateway {
    server: GatewayServer,
    routes: RouteTableHandle,
    tls: Option<Arc<TlsTerminator>>,
    http: Option<Listener>,
    https: Option<Listener>,
    admin: Option<(TcpListener, AdminState)>,
    watch: Option<(RecommendedWatcher, mpsc::UnboundedReceiver<()>)>,
}

impl Gateway {
    pub async fn start(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let tls = match &config.tls {
            Some(tls_config) => {
                let terminator = TlsTerminator::from_config(
                    tls_config,
                    &config.ocsp,
                    Duration::from_secs(config.timeouts.handshake_secs),
                )?;
                tracing::info!(
                    ciphers = ?terminator.policy().names(),
                    client_certificates = terminator.requests_client_certificates(),
                    "TLS initialized"
                );
                Some(Arc::new(terminator))
            }
            None => {
                tracing::warn!("No [tls] section, serving plaintext only");
                None
            }
        };

        let auth = match &config.tls {
            Some(tls_config) => {
                let issuer = TokenIssuer::from_config(&config.auth, Path::new(&tls_config.key_path))?;
                tracing::info!(algorithm = ?issuer.algorithm(), path = %config.auth.path, "Client certificate auth ready");
                Some(Arc::new(ClientCertAuth::new(
                    issuer,
                    config.auth.cookie_name.clone(),
                    Duration::from_secs(config.auth.client_cert_timeout_secs),
                )))
            }
            None => None,
        };

        let routes_path = Path::new(&config.routes.path);
        let routes = RouteTableHandle::load(routes_path, config.routes.default_host.clone()).await?;
        let watch = if config.routes.watch {
            let (watcher, changes) = RoutesWatcher::new(routes_path);
            Some((watcher.run()?, changes))
        } else {
            None
        };

        let forwarder = Arc::new(HyperForwarder::new(Duration::from_secs(config.timeouts.connect_secs))?);
        let request_timeout = Duration::from_secs(config.timeouts.request_secs);
        let dispatcher = Arc::new(
            Dispatcher::new(routes.clone(), forwarder, auth, config.auth.path.clone())
                .with_upstream_timeout(request_timeout),
        );
        let server = GatewayServer::new(dispatcher, tls.clone(), request_timeout);

        let limit = ConnectionLimit::new(config.listener.max_connections);
        let http = Some(Listener::bind(&config.listener.http_address, "http", limit.clone()).await?);
        let https = match &tls {
            Some(_) => Some(Listener::bind(&config.listener.https_address, "https", limit).await?),
            None => None,
        };

        let admin = if config.admin.enabled {
            let listener = TcpListener::bind(&config.admin.bind_address)
                .await
                .map_err(GatewayError::Admin)?;
            let state = AdminState {
                routes: routes.clone(),
                tls: tls.clone(),
                tracker: server.tracker().clone(),
                api_key: Arc::from(config.admin.api_key.as_str()),
                started: Instant::now(),
            };
            Some((listener, state))
        } else {
            None
        };

        Ok(Self {
            server,
            routes,
            tls,
            http,
            https,
            admin,
            watch,
        })
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin.as_ref().and_then(|(l, _)| l.local_addr().ok())
    }

    pub fn routes(&self) -> &RouteTableHandle {
        &self.routes
    }

    pub fn tls(&self) -> Option<&Arc<TlsTerminator>> {
        self.tls.as_ref()
    }

    /// Serve until `shutdown` fires, then drain.
    pub async fn run(self, shutdown: Shutdown) {
        let _watcher = match self.watch {
            Some((watcher, changes)) => {
                tokio::spawn(self.routes.clone().run_reload_loop(changes, shutdown.clone()));
                Some(watcher)
            }
            None => None,
        };

        if let Some((listener, state)) = self.admin {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let address = listener.local_addr().ok();
                tracing::info!(address = ?address, "Admin API listening");
                let serve = axum::serve(listener, setup_admin_router(state))
                    .with_graceful_shutdown(async move { shutdown.wait().await });
                if let Err(e) = serve.await {
                    tracing::error!(error = %e, "Admin API stopped");
                }
            });
        }

        self.server.run(self.http, self.https, shutdown).await;
    }

    /// [`run`](Self::run) with OS signal handling.
    pub async fn run_until_signalled(self) {
        let shutdown = Shutdown::new();
        tokio::spawn(signals::handle_signals(shutdown.clone(), self.routes.clone()));
        self.run(shutdown).await;
    }
}
