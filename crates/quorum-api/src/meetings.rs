use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use quorum_types::ServiceError;
use quorum_types::api::{CheckinRequest, CheckinResponse, MeetingView, VoteRequest};

use crate::error::{ApiError, join_err};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    /// JSON-encoded `{meeting_id: token}` map of the caller's held tokens.
    #[serde(default)]
    pub tokens: String,
}

pub fn parse_token_map(raw: &str) -> Result<HashMap<String, String>, ServiceError> {
    if raw.is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(raw)
        .map_err(|_| ServiceError::InvalidInput("invalid tokens parameter".to_string()))
}

/// One-shot snapshot of the available meetings, personalized for the
/// caller. The SSE stream pushes the same payload periodically.
pub async fn list_meetings(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Vec<MeetingView>>, ApiError> {
    let tokens = parse_token_map(&query.tokens)?;

    let views = tokio::task::spawn_blocking(move || state.views.list_available(&tokens))
        .await
        .map_err(join_err)??;

    Ok(Json(views))
}

pub async fn check_in(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    Json(req): Json<CheckinRequest>,
) -> Result<Json<CheckinResponse>, ApiError> {
    let token = tokio::task::spawn_blocking(move || {
        state
            .checkins
            .check_in(&meeting_id, &req.code, req.token.as_deref())
    })
    .await
    .map_err(join_err)??;

    Ok(Json(CheckinResponse { token }))
}

pub async fn cast_vote(
    State(state): State<AppState>,
    Path((meeting_id, poll_id)): Path<(String, String)>,
    Json(req): Json<VoteRequest>,
) -> Result<StatusCode, ApiError> {
    tokio::task::spawn_blocking(move || {
        state
            .votes
            .cast_vote(&meeting_id, &poll_id, &req.token, req.choice)
    })
    .await
    .map_err(join_err)??;

    Ok(StatusCode::NO_CONTENT)
}
