//! Channel API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use herald_core::{
    store::ResetSummary, AddChannelRequest, ChannelFilter, ChannelStatus, CycleReport,
    ServiceError, SourceError,
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing channels
#[derive(Debug, Deserialize)]
pub struct ListChannelsParams {
    /// Only active (true) or only deactivated (false) channels
    pub active: Option<bool>,
}

/// Request body for changing the poll interval
#[derive(Debug, Deserialize)]
pub struct SetIntervalBody {
    pub poll_interval_secs: u64,
}

/// Request body for resetting a channel's history
#[derive(Debug, Deserialize)]
pub struct ResetHistoryBody {
    /// Keep delivery receipts so reset items are not notified again
    #[serde(default = "default_keep_receipts")]
    pub keep_receipts: bool,
}

fn default_keep_receipts() -> bool {
    true
}

/// Response for listing channels
#[derive(Debug, Serialize)]
pub struct ListChannelsResponse {
    pub channels: Vec<ChannelStatus>,
    pub total: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// Map a service error to an HTTP status and body.
pub fn error_response(e: ServiceError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        ServiceError::ChannelNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::ChannelInactive(_) | ServiceError::AlreadyTracked(_) => StatusCode::CONFLICT,
        ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ServiceError::Quota(_) => StatusCode::TOO_MANY_REQUESTS,
        ServiceError::Source(SourceError::ChannelNotFound(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Source(SourceError::QuotaExceeded(_)) => StatusCode::TOO_MANY_REQUESTS,
        ServiceError::Source(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Scheduler(_) | ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("Channel request failed: {}", e);
    }

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// List channels with their status
pub async fn list_channels(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListChannelsParams>,
) -> ApiResult<Json<ListChannelsResponse>> {
    let filter = ChannelFilter {
        active: params.active,
    };
    let channels = state
        .service()
        .list_channels(&filter)
        .map_err(error_response)?;

    Ok(Json(ListChannelsResponse {
        total: channels.len(),
        channels,
    }))
}

/// Start tracking a channel
pub async fn add_channel(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddChannelRequest>,
) -> ApiResult<(StatusCode, Json<ChannelStatus>)> {
    let service = state.service();
    let channel = service.add_channel(body).await.map_err(error_response)?;
    let status = service
        .channel_status(&channel.id)
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(status)))
}

/// Get one channel's status
pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChannelStatus>> {
    state
        .service()
        .channel_status(&id)
        .map(Json)
        .map_err(error_response)
}

/// Stop tracking a channel (history is kept)
pub async fn remove_channel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChannelStatus>> {
    let service = state.service();
    service.remove_channel(&id).map_err(error_response)?;
    service.channel_status(&id).map(Json).map_err(error_response)
}

/// Run a cycle for a channel now
pub async fn check_channel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CycleReport>> {
    state
        .service()
        .check_now(&id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// Change a channel's poll interval
pub async fn set_interval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SetIntervalBody>,
) -> ApiResult<Json<ChannelStatus>> {
    let service = state.service();
    service
        .set_interval(&id, body.poll_interval_secs)
        .map_err(error_response)?;
    service.channel_status(&id).map(Json).map_err(error_response)
}

/// Clear a channel's item history and watermark
pub async fn reset_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ResetHistoryBody>,
) -> ApiResult<Json<ResetSummary>> {
    state
        .service()
        .reset_history(&id, body.keep_receipts)
        .map(Json)
        .map_err(error_response)
}
