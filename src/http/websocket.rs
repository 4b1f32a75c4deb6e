//! Upgrade tunnelling.
//!
//! # Data Flow
//! ```text
//! Client ──upgrade req──▶ Gateway ──upgrade req──▶ Backend
//! Client ◀──── 101 ───── Gateway ◀──── 101 ────── Backend
//! Client ◀════════ raw bytes, both directions ════════▶ Backend
//! ```
//!
//! The tunnel is byte-level: frames are neither parsed nor buffered, so
//! close and ping/pong pass through untouched. Any protocol the backend
//! agrees to switch to works, WebSocket being the common case.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::copy_bidirectional;

use crate::http::forward::{bounded, Forward, ProxyTransportError};
use crate::http::request::strip_hop_by_hop;
use crate::net::ConnectionInfo;

/// Forward an upgrade request and, once the backend switches protocols,
/// splice the two upgraded connections together.
///
/// A backend that declines the upgrade has its response relayed as-is. The
/// tunnel holds the connection's lease, so it keeps its listener slot and
/// counts for draining; it is torn down when the gateway shuts down.
pub async fn tunnel(
    forwarder: &dyn Forward,
    mut request: Request<Body>,
    conn: &ConnectionInfo,
    upstream_timeout: Duration,
) -> Result<Response<Body>, ProxyTransportError> {
    let client_upgrade = hyper::upgrade::on(&mut request);
    let mut response = bounded(upstream_timeout, forwarder.forward(request)).await?;

    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        strip_hop_by_hop(response.headers_mut());
        return Ok(response);
    }

    let backend_upgrade = hyper::upgrade::on(&mut response);
    let connection = conn.id;
    let lease = conn.lease.clone();
    tokio::spawn(async move {
        let (client, backend) = match tokio::try_join!(client_upgrade, backend_upgrade) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(connection_id = %connection, error = %e, "Upgrade failed");
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut backend = TokioIo::new(backend);
        let shutdown = async {
            match &lease {
                Some(lease) => lease.shutdown_requested().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = copy_bidirectional(&mut client, &mut backend) => match result {
                Ok((to_backend, to_client)) => {
                    tracing::debug!(connection_id = %connection, to_backend, to_client, "Tunnel closed")
                }
                Err(e) => tracing::debug!(connection_id = %connection, error = %e, "Tunnel ended with error"),
            },
            _ = shutdown => tracing::debug!(connection_id = %connection, "Tunnel closed for shutdown"),
        }
        drop(lease);
    });

    let (parts, _) = response.into_parts();
    Ok(Response::from_parts(parts, Body::empty()))
}
