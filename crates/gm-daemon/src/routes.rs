//! Axum router and all HTTP handlers for gm-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers so tests can use the bare router.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::{
    api_types::{HealthResponse, RunRefusedResponse},
    state::{uptime_secs, AppState},
};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/accrual/status", get(accrual_status))
        .route("/v1/accrual/run", post(accrual_run))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            daemon_uptime_secs: uptime_secs(),
            config_hash: st.config_hash.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/accrual/status
// ---------------------------------------------------------------------------

pub(crate) async fn accrual_status(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(st.scheduler.status().await))
}

// ---------------------------------------------------------------------------
// POST /v1/accrual/run
// ---------------------------------------------------------------------------

/// Run one reconciliation cycle now and return its report.
///
/// `409 Conflict` if a cycle is already running; `503` once shutdown began.
pub(crate) async fn accrual_run(State(st): State<Arc<AppState>>) -> Response {
    if st.shutdown.is_cancelled() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(RunRefusedResponse {
                error: "SHUTTING_DOWN: daemon is stopping".to_string(),
            }),
        )
            .into_response();
    }

    info!("manual accrual cycle requested");
    match st.scheduler.run_now(&st.shutdown).await {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(RunRefusedResponse {
                error: "CYCLE_RUNNING: an accrual cycle is already in progress".to_string(),
            }),
        )
            .into_response(),
    }
}
