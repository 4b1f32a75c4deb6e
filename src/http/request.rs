//! Inbound request inspection and upstream request preparation.
//!
//! # Responsibilities
//! - Determine the effective host of a request
//! - Detect upgrade requests
//! - Rewrite the URI to the backend target
//! - Strip hop-by-hop headers and add forwarding metadata

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, Uri};

use crate::net::ConnectionInfo;
use crate::routing::TargetRef;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_PORT: &str = "x-forwarded-port";

/// Headers meaningful only for a single hop.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Host the client addressed: the `Host` header, else the URI authority.
pub fn request_host<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))
        .filter(|h| !h.trim().is_empty())
}

/// Whether the request asks for a protocol upgrade (`Connection: upgrade`).
pub fn is_upgrade<B>(request: &Request<B>) -> bool {
    let connection_upgrade = request
        .headers()
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    connection_upgrade && request.headers().contains_key(header::UPGRADE)
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Append this hop to the `X-Forwarded-*` headers.
pub fn add_forwarding_headers(headers: &mut HeaderMap, conn: &ConnectionInfo, host: Option<&str>) {
    let client_ip = conn.remote_addr.ip().to_string();
    let forwarded_for = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(previous) if !previous.is_empty() => format!("{}, {}", previous, client_ip),
        _ => client_ip,
    };

    let mut set = |name: &'static str, value: &str| {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    };
    set(X_FORWARDED_FOR, &forwarded_for);
    if let Some(host) = host {
        set(X_FORWARDED_HOST, host);
    }
    set(X_FORWARDED_PROTO, conn.scheme());
    set(X_FORWARDED_PORT, &conn.local_addr.port().to_string());
}

/// Point `uri` at `target`, keeping path and query.
pub fn target_uri(uri: &Uri, target: &TargetRef) -> Result<Uri, axum::http::Error> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Uri::builder()
        .scheme(target.scheme.as_str())
        .authority(target.authority())
        .path_and_query(path_and_query)
        .build()
}

/// Turn an inbound request into the one sent to `target`.
///
/// For upgrades the `Connection`/`Upgrade` pair is kept so the backend can
/// switch protocols.
pub fn prepare_upstream(
    mut request: Request<Body>,
    target: &TargetRef,
    conn: &ConnectionInfo,
    upgrade: bool,
) -> Result<Request<Body>, axum::http::Error> {
    let host = request_host(&request);
    *request.uri_mut() = target_uri(request.uri(), target)?;

    let headers = request.headers_mut();
    let upgrade_protocol = headers.get(header::UPGRADE).cloned();
    strip_hop_by_hop(headers);
    if upgrade {
        if let Some(protocol) = upgrade_protocol {
            headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
            headers.insert(header::UPGRADE, protocol);
        }
    }
    add_forwarding_headers(headers, conn, host.as_deref());

    Ok(request)
}
