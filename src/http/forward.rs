//! Backend forwarding transport.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::{ClientConfig, RootCertStore};

/// The backend could not be reached or did not answer.
#[derive(Debug, thiserror::Error)]
pub enum ProxyTransportError {
    #[error("invalid upstream request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("TLS client configuration: {0}")]
    Tls(#[from] rustls::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

/// Wait for a backend's response head for at most `limit`.
pub async fn bounded<F>(limit: Duration, forward: F) -> Result<Response<Body>, ProxyTransportError>
where
    F: Future<Output = Result<Response<Body>, ProxyTransportError>>,
{
    tokio::time::timeout(limit, forward)
        .await
        .unwrap_or(Err(ProxyTransportError::Timeout(limit)))
}

/// Sends a prepared request (absolute URI) to its backend.
#[async_trait]
pub trait Forward: Send + Sync {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, ProxyTransportError>;
}

/// Pooled hyper client speaking HTTP/1.1 to `http` and `https` backends.
#[derive(Clone)]
pub struct HyperForwarder {
    client: Client<HttpsConnector<HttpConnector>, Body>,
}

impl HyperForwarder {
    pub fn new(connect_timeout: Duration) -> Result<Self, ProxyTransportError> {
        let mut http = HttpConnector::new();
        http.set_connect_timeout(Some(connect_timeout));
        http.set_nodelay(true);
        http.enforce_http(false);

        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let tls = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        Ok(Self {
            client: Client::builder(TokioExecutor::new()).build(https),
        })
    }
}

#[async_trait]
impl Forward for HyperForwarder {
    async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, ProxyTransportError> {
        let response = self.client.request(request).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}
