use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domain::CoreError;
use serde_json::json;

/// Maps `CoreError` onto HTTP status codes, without leaking
/// platform-specific codes. `Transient` surfaces as 503 with a retry hint
/// rather than the
/// worker-side retry/backoff treatment `apps/scheduler` gives it — there is
/// no background retry loop at the API boundary.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            CoreError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "validation", "message": message }),
            ),
            CoreError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found", "message": message }),
            ),
            CoreError::Conflict(message) => (
                StatusCode::CONFLICT,
                json!({ "error": "conflict", "message": message }),
            ),
            CoreError::SpacingConflict { message, neighbors } => (
                StatusCode::CONFLICT,
                json!({ "error": "spacing_conflict", "message": message, "neighbors": neighbors }),
            ),
            CoreError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": "rate_limited", "retry_after_secs": retry_after.as_secs() }),
            ),
            CoreError::Transient(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "transient", "message": message }),
            ),
            CoreError::Terminal { code, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": code, "message": message }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
