//! Admin control plane.
//!
//! A small authenticated HTTP API on a separate (loopback by default)
//! listener for inspection and maintenance: route reloads, TLS state, OCSP
//! cache flushes.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::net::ConnectionTracker;
use crate::routing::RouteTableHandle;
use crate::tls::TlsTerminator;

#[derive(Clone)]
pub struct AdminState {
    pub routes: RouteTableHandle,
    pub tls: Option<Arc<TlsTerminator>>,
    pub tracker: ConnectionTracker,
    pub api_key: Arc<str>,
    pub started: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/routes/reload", post(reload_routes))
        .route("/admin/tls", get(get_tls))
        .route("/admin/ocsp", delete(clear_ocsp))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
