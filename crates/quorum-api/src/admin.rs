use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use quorum_cache::CacheStats;
use quorum_types::ServiceError;
use quorum_types::api::{
    CreateMeetingRequest, CreateMeetingResponse, CreatePollRequest, CreatePollResponse,
};

use crate::error::{ApiError, join_err};
use crate::state::AppState;

pub async fn create_meeting(
    State(state): State<AppState>,
    Json(req): Json<CreateMeetingRequest>,
) -> Result<(StatusCode, Json<CreateMeetingResponse>), ApiError> {
    let (id, code) =
        tokio::task::spawn_blocking(move || state.admin.create_meeting(req.start_time, req.end_time))
            .await
            .map_err(join_err)??;

    Ok((StatusCode::CREATED, Json(CreateMeetingResponse { id, code })))
}

pub async fn delete_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = tokio::task::spawn_blocking(move || state.admin.delete_meeting(&meeting_id))
        .await
        .map_err(join_err)??;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::NotFound.into())
    }
}

pub async fn create_poll(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    Json(req): Json<CreatePollRequest>,
) -> Result<(StatusCode, Json<CreatePollResponse>), ApiError> {
    let id = tokio::task::spawn_blocking(move || state.admin.create_poll(&meeting_id, &req.name))
        .await
        .map_err(join_err)??;

    Ok((StatusCode::CREATED, Json(CreatePollResponse { id })))
}

pub async fn delete_poll(
    State(state): State<AppState>,
    Path((meeting_id, poll_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let deleted = tokio::task::spawn_blocking(move || state.admin.delete_poll(&meeting_id, &poll_id))
        .await
        .map_err(join_err)??;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::NotFound.into())
    }
}

/// Cache effectiveness per shared snapshot, for monitoring.
pub async fn cache_stats(State(state): State<AppState>) -> Json<BTreeMap<String, CacheStats>> {
    Json(state.cache.stats())
}
