use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quorum_types::ServiceError;
use serde_json::json;
use tracing::{error, warn};

/// Newtype so `ServiceError` can cross the axum boundary with `?`.
///
/// The first group of outcomes is user-actionable and surfaces as-is;
/// `Transient` and `Internal` are logged with full detail server-side and
/// reach the client only as a generic message.
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            ServiceError::NotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            ServiceError::InvalidCode
            | ServiceError::InvalidPoll
            | ServiceError::InvalidToken
            | ServiceError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            ServiceError::NotAvailable => (StatusCode::FORBIDDEN, self.0.to_string()),
            ServiceError::AlreadyVoted => (StatusCode::CONFLICT, self.0.to_string()),
            ServiceError::Transient(source) => {
                warn!("transient backend error: {source:#}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service temporarily unavailable".to_string(),
                )
            }
            ServiceError::Internal(source) => {
                error!("internal error: {source:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Maps a `spawn_blocking` join failure — the task panicked or was
/// aborted — to an internal error.
pub fn join_err(err: tokio::task::JoinError) -> ApiError {
    ApiError(ServiceError::Internal(anyhow::anyhow!(
        "blocking task failed: {err}"
    )))
}
