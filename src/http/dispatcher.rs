//! Request dispatch.
//!
//! # Responsibilities
//! - Run the client-certificate flow on the reserved path
//! - Resolve every other request against the current route table
//! - Forward plain requests and tunnel upgrades
//! - Answer unmatched requests and transport failures with 502
//!
//! # Design Decisions
//! - The table snapshot is taken once per request, so a reload in the middle
//!   of a request cannot mix two tables
//! - Unmatched upgrades get the same 502 as plain requests

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;

use crate::auth::{ClientCertAuth, HandshakeChallenge};
use crate::http::forward::{bounded, Forward, ProxyTransportError};
use crate::http::request::{is_upgrade, prepare_upstream, request_host, strip_hop_by_hop, X_REQUEST_ID};
use crate::http::response::bad_gateway;
use crate::http::websocket;
use crate::net::ConnectionInfo;
use crate::observability::metrics;
use crate::routing::RouteTableHandle;

/// Upper bound on waiting for a backend's response head.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Dispatcher {
    routes: RouteTableHandle,
    forwarder: Arc<dyn Forward>,
    auth: Option<Arc<ClientCertAuth>>,
    auth_path: String,
    upstream_timeout: Duration,
}

impl Dispatcher {
    /// `auth` is `None` when no TLS listener exists; the reserved path then
    /// always fails with 403.
    pub fn new(
        routes: RouteTableHandle,
        forwarder: Arc<dyn Forward>,
        auth: Option<Arc<ClientCertAuth>>,
        auth_path: impl Into<String>,
    ) -> Self {
        Self {
            routes,
            forwarder,
            auth,
            auth_path: auth_path.into(),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    /// A backend that has not answered within `timeout` gets the request a 502.
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn routes(&self) -> &RouteTableHandle {
        &self.routes
    }

    pub fn auth_path(&self) -> &str {
        &self.auth_path
    }

    /// Handle one request from `conn`.
    pub async fn dispatch(&self, conn: &ConnectionInfo, request: Request<Body>) -> Response<Body> {
        let started = Instant::now();
        let method = request.method().to_string();
        let request_id = request
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        let (response, outcome) = if request.uri().path() == self.auth_path {
            (self.authenticate(conn).await, "auth")
        } else {
            self.route(conn, request, &request_id).await
        };

        metrics::record_request(&method, response.status().as_u16(), outcome, started);
        response
    }

    async fn authenticate(&self, conn: &ConnectionInfo) -> Response<Body> {
        let Some(auth) = &self.auth else {
            return crate::auth::AuthFailure::NotEncrypted.into_response();
        };
        let tls = conn.tls.as_deref();
        let challenge = HandshakeChallenge::new(&tls.cloned().unwrap_or_default(), conn.client_cert_requested);

        match auth.authenticate(tls, &challenge).await {
            Ok(success) => success.into_response(),
            Err(failure) => failure.into_response(),
        }
    }

    async fn route(
        &self,
        conn: &ConnectionInfo,
        request: Request<Body>,
        request_id: &str,
    ) -> (Response<Body>, &'static str) {
        let host = request_host(&request);
        let path = request.uri().path().to_string();
        let upgrade = is_upgrade(&request);

        let table = self.routes.snapshot();
        let target = match table.resolve(host.as_deref(), &path) {
            Ok(target) => target.clone(),
            Err(not_found) => {
                tracing::warn!(
                    request_id,
                    connection_id = %conn.id,
                    upgrade,
                    "{}",
                    not_found
                );
                return (bad_gateway(not_found), "unmatched");
            }
        };

        tracing::debug!(request_id, connection_id = %conn.id, target = %target, upgrade, path = %path, "Forwarding");

        let upstream = match prepare_upstream(request, &target, conn, upgrade) {
            Ok(upstream) => upstream,
            Err(e) => return (self.transport_failure(ProxyTransportError::from(e), request_id), "upstream_error"),
        };

        if upgrade {
            let tunnel = websocket::tunnel(self.forwarder.as_ref(), upstream, conn, self.upstream_timeout);
            return match tunnel.await {
                Ok(response) => (response, "upgraded"),
                Err(e) => (self.transport_failure(e, request_id), "upstream_error"),
            };
        }

        match bounded(self.upstream_timeout, self.forwarder.forward(upstream)).await {
            Ok(mut response) => {
                strip_hop_by_hop(response.headers_mut());
                (response, "forwarded")
            }
            Err(e) => (self.transport_failure(e, request_id), "upstream_error"),
        }
    }

    fn transport_failure(&self, error: ProxyTransportError, request_id: &str) -> Response<Body> {
        tracing::error!(request_id, error = %error, "Upstream error");
        bad_gateway(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ConnectionId;
    use crate::routing::{RouteTable, RoutesDefinition};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::net::SocketAddr;
    use std::sync::Mutex;

    /// Records what it was asked to forward and answers 200.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Forward for Recorder {
        async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, ProxyTransportError> {
            self.seen.lock().unwrap().push(request.uri().to_string());
            Ok(Response::new(Body::from("backend")))
        }
    }

    fn dispatcher(routes: &str, default_host: Option<&str>) -> (Dispatcher, Arc<Recorder>) {
        let definition = RoutesDefinition::from_json(routes).unwrap();
        let table = RouteTable::build(&definition, default_host).unwrap();
        let handle = RouteTableHandle::new(table, default_host.map(str::to_string));
        let recorder = Arc::new(Recorder::default());
        (Dispatcher::new(handle, recorder.clone(), None, "/pki/"), recorder)
    }

    fn conn() -> ConnectionInfo {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        ConnectionInfo::plaintext(ConnectionId::new(), addr, addr)
    }

    fn get(host: Option<&str>, path: &str) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(host) = host {
            builder = builder.header("host", host);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const ROUTES: &str = r#"{"rules": [{"matchHost": "a.example.com", "target": "10.0.0.1:8080"}]}"#;

    #[tokio::test]
    async fn matched_request_is_forwarded() {
        let (dispatcher, recorder) = dispatcher(ROUTES, None);
        let response = dispatcher.dispatch(&conn(), get(Some("a.example.com"), "/x?y=1")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "backend");
        assert_eq!(recorder.seen.lock().unwrap().as_slice(), ["http://10.0.0.1:8080/x?y=1"]);
    }

    #[tokio::test]
    async fn unmatched_request_is_502_naming_host() {
        let (dispatcher, recorder) = dispatcher(ROUTES, None);
        let response = dispatcher.dispatch(&conn(), get(Some("b.example.com"), "/")).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_text(response).await;
        assert!(body.starts_with("502 Bad Gateway\n\n"));
        assert!(body.contains("UNMATCHED request: b.example.com/"));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmatched_upgrade_is_502() {
        let (dispatcher, _) = dispatcher(ROUTES, None);
        let request = Request::builder()
            .uri("/socket")
            .header("host", "b.example.com")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap();

        let response = dispatcher.dispatch(&conn(), request).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_text(response).await.contains("b.example.com/socket"));
    }

    #[tokio::test]
    async fn missing_host_uses_default_host() {
        let (dispatcher, recorder) = dispatcher(ROUTES, Some("a.example.com"));
        let response = dispatcher.dispatch(&conn(), get(None, "/")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reserved_path_without_tls_is_403() {
        let (dispatcher, recorder) = dispatcher(ROUTES, None);
        let response = dispatcher.dispatch(&conn(), get(Some("a.example.com"), "/pki/")).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reload_is_seen_by_later_requests() {
        let (dispatcher, _) = dispatcher(ROUTES, None);
        dispatcher
            .routes()
            .reload_from_str(r#"{"b.example.com": "10.0.0.2:9000"}"#)
            .unwrap();

        let old = dispatcher.dispatch(&conn(), get(Some("a.example.com"), "/")).await;
        let new = dispatcher.dispatch(&conn(), get(Some("b.example.com"), "/")).await;
        assert_eq!(old.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(new.status(), StatusCode::OK);
    }

    struct Refuse;

    #[async_trait]
    impl Forward for Refuse {
        async fn forward(&self, _request: Request<Body>) -> Result<Response<Body>, ProxyTransportError> {
            Err(ProxyTransportError::Tls(rustls::Error::General("backend refused".into())))
        }
    }

    /// Accepts the request and never answers.
    struct Hang;

    #[async_trait]
    impl Forward for Hang {
        async fn forward(&self, _request: Request<Body>) -> Result<Response<Body>, ProxyTransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn silent_backend_is_502_after_upstream_timeout() {
        let definition = RoutesDefinition::from_json(ROUTES).unwrap();
        let handle = RouteTableHandle::new(RouteTable::build(&definition, None).unwrap(), None);
        let dispatcher =
            Dispatcher::new(handle, Arc::new(Hang), None, "/pki/").with_upstream_timeout(Duration::from_millis(50));

        let response = dispatcher.dispatch(&conn(), get(Some("a.example.com"), "/")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_text(response).await;
        assert!(body.starts_with("502 Bad Gateway\n\n"));
        assert!(body.contains("did not respond within"));
    }

    #[tokio::test]
    async fn transport_error_is_502_with_diagnostic() {
        let definition = RoutesDefinition::from_json(ROUTES).unwrap();
        let handle = RouteTableHandle::new(RouteTable::build(&definition, None).unwrap(), None);
        let dispatcher = Dispatcher::new(handle, Arc::new(Refuse), None, "/pki/");

        let response = dispatcher.dispatch(&conn(), get(Some("a.example.com"), "/")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_text(response).await.contains("backend refused"));
    }
}
