use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use herald_core::{HealthReport, SanitizedConfig, TrackerOverview};
use serde::Serialize;
use std::sync::Arc;

use super::channels::{error_response, ErrorResponse};
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Dependency checks; 503 when the tracker cannot do its work.
pub async fn health_checks(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = state.service().health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Scheduler, quota and channel counts.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TrackerOverview>, (StatusCode, Json<ErrorResponse>)> {
    state.service().overview().map(Json).map_err(error_response)
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
