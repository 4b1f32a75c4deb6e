//! Gateway-generated responses.

use std::fmt::Display;

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};

/// Plain-text failure: `"<code> <reason>\n\n<diagnostic>"`.
pub fn gateway_failure(status: StatusCode, diagnostic: impl Display) -> Response<Body> {
    let body = format!(
        "{} {}\n\n{}",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        diagnostic
    );
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

pub fn bad_gateway(diagnostic: impl Display) -> Response<Body> {
    gateway_failure(StatusCode::BAD_GATEWAY, diagnostic)
}
