//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::Request;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use serde_json::{json, Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use yxorp::config::{GatewayConfig, TlsConfig};
use yxorp::routing::RouteTableHandle;
use yxorp::tls::TlsTerminator;
use yxorp::{Gateway, Shutdown};

/// Start a backend that answers every request with a fixed body.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                let response_str = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

async fn echo(request: Request<Body>) -> Json<Value> {
    let headers: Map<String, Value> = request
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
        .collect();
    Json(json!({
        "method": request.method().as_str(),
        "uri": request.uri().to_string(),
        "headers": headers,
    }))
}

async fn ws_echo(upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(|mut socket| async move {
        while let Some(Ok(msg)) = socket.recv().await {
            if socket.send(msg).await.is_err() {
                break;
            }
        }
    })
}

/// Start a backend that echoes request details as JSON and WebSocket
/// messages on `/ws`.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/ws", get(ws_echo)).fallback(echo);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Start a backend that reads the request and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn write_routes(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("routes.json");
    std::fs::write(&path, json).unwrap();
    path
}

/// Loopback config on ephemeral ports, no file watching.
pub fn gateway_config(routes_path: &Path, tls: Option<TlsConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.http_address = "127.0.0.1:0".into();
    config.listener.https_address = "127.0.0.1:0".into();
    config.routes.path = routes_path.display().to_string();
    config.routes.watch = false;
    config.timeouts.connect_secs = 2;
    config.timeouts.request_secs = 5;
    config.tls = tls;
    config
}

pub struct TestGateway {
    pub http: SocketAddr,
    pub https: Option<SocketAddr>,
    pub routes: RouteTableHandle,
    pub tls: Option<Arc<TlsTerminator>>,
    pub shutdown: Shutdown,
}

pub async fn start_gateway(config: &GatewayConfig) -> TestGateway {
    let gateway = Gateway::start(config).await.unwrap();
    let shutdown = Shutdown::new();
    let handle = TestGateway {
        http: gateway.http_addr().unwrap(),
        https: gateway.https_addr(),
        routes: gateway.routes().clone(),
        tls: gateway.tls().cloned(),
        shutdown: shutdown.clone(),
    };
    tokio::spawn(gateway.run(shutdown));
    handle
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

/// A CA, a server certificate for `gateway.test`, and a client certificate
/// for CN `alice`, written to a directory.
pub struct TestPki {
    pub ca_pem: String,
    pub server_cert_der: Vec<u8>,
    pub client_identity_pem: String,
    pub tls: TlsConfig,
}

impl TestPki {
    pub fn generate(dir: &Path) -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.distinguished_name.push(DnType::CommonName, "yxorp test CA");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let server_key = KeyPair::generate().unwrap();
        let mut server_params = CertificateParams::new(vec!["gateway.test".to_string()]).unwrap();
        server_params.distinguished_name.push(DnType::CommonName, "gateway.test");
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server = server_params.signed_by(&server_key, &ca, &ca_key).unwrap();

        let client_key = KeyPair::generate().unwrap();
        let mut client_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        client_params.distinguished_name.push(DnType::CommonName, "alice");
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let client = client_params.signed_by(&client_key, &ca, &ca_key).unwrap();

        let cert_path = dir.join("server.crt");
        let key_path = dir.join("server.key");
        let ca_path = dir.join("ca.crt");
        std::fs::write(&cert_path, server.pem()).unwrap();
        std::fs::write(&key_path, server_key.serialize_pem()).unwrap();
        std::fs::write(&ca_path, ca.pem()).unwrap();

        Self {
            ca_pem: ca.pem(),
            server_cert_der: server.der().to_vec(),
            client_identity_pem: format!("{}{}", client.pem(), client_key.serialize_pem()),
            tls: TlsConfig {
                cert_path: cert_path.display().to_string(),
                key_path: key_path.display().to_string(),
                ca_path: Some(ca_path.display().to_string()),
                cipher_suites: Vec::new(),
                session_capacity: 100,
                session_ttl_secs: 300,
            },
        }
    }

    /// reqwest client trusting the test CA; `gateway.test` resolves to `addr`.
    pub fn client(&self, addr: SocketAddr, with_identity: bool) -> reqwest::Client {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(reqwest::Certificate::from_pem(self.ca_pem.as_bytes()).unwrap())
            .resolve("gateway.test", addr);
        if with_identity {
            builder = builder.identity(reqwest::Identity::from_pem(self.client_identity_pem.as_bytes()).unwrap());
        }
        builder.build().unwrap()
    }
}
