use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::routing::router::RouteSummary;
use crate::routing::RoutesError;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub route_generation: u64,
    pub active_connections: u64,
    pub tls_enabled: bool,
}

#[derive(Serialize)]
pub struct RoutesView {
    pub generation: u64,
    pub source: Option<String>,
    pub default_target: Option<String>,
    pub rules: Vec<RouteSummary>,
}

#[derive(Serialize)]
pub struct ReloadOutcome {
    pub generation: u64,
}

#[derive(Serialize)]
pub struct AdminError {
    pub error: String,
    pub generation: u64,
}

#[derive(Serialize)]
pub struct SessionStoreView {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
}

#[derive(Serialize)]
pub struct OcspView {
    pub enabled: bool,
    pub strict: bool,
    pub cached_responses: usize,
}

#[derive(Serialize)]
pub struct TlsView {
    pub cipher_suites: Vec<String>,
    pub client_certificates_requested: bool,
    pub sessions: SessionStoreView,
    pub ocsp: Option<OcspView>,
}

#[derive(Serialize)]
pub struct OcspCleared {
    pub cleared: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        route_generation: state.routes.generation(),
        active_connections: state.tracker.active_count(),
        tls_enabled: state.tls.is_some(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<RoutesView> {
    let table = state.routes.snapshot();
    Json(RoutesView {
        generation: state.routes.generation(),
        source: state.routes.source().map(|p| p.display().to_string()),
        default_target: table.default_target().map(ToString::to_string),
        rules: table.summary(),
    })
}

pub async fn reload_routes(
    State(state): State<AdminState>,
) -> Result<Json<ReloadOutcome>, (StatusCode, Json<AdminError>)> {
    match state.routes.reload().await {
        Ok(generation) => Ok(Json(ReloadOutcome { generation })),
        Err(e) => {
            let status = match e {
                RoutesError::Read { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                RoutesError::Malformed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            };
            Err((
                status,
                Json(AdminError {
                    error: e.to_string(),
                    generation: state.routes.generation(),
                }),
            ))
        }
    }
}

pub async fn get_tls(State(state): State<AdminState>) -> Result<Json<TlsView>, StatusCode> {
    let tls = state.tls.as_ref().ok_or(StatusCode::NOT_FOUND)?;
    let sessions = tls.sessions();
    Ok(Json(TlsView {
        cipher_suites: tls.policy().names(),
        client_certificates_requested: tls.requests_client_certificates(),
        sessions: SessionStoreView {
            entries: sessions.len(),
            capacity: sessions.capacity(),
            ttl_secs: sessions.ttl().as_secs(),
        },
        ocsp: tls.stapler().map(|stapler| OcspView {
            enabled: stapler.is_enabled(),
            strict: stapler.is_strict(),
            cached_responses: stapler.cache().len(),
        }),
    }))
}

pub async fn clear_ocsp(State(state): State<AdminState>) -> Result<Json<OcspCleared>, StatusCode> {
    let stapler = state
        .tls
        .as_ref()
        .and_then(|tls| tls.stapler())
        .ok_or(StatusCode::NOT_FOUND)?;
    let cleared = stapler.cache().len();
    stapler.cache().clear();
    tracing::info!(cleared, "OCSP cache cleared");
    Ok(Json(OcspCleared { cleared }))
}
