//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lifecycle::LifecycleError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Payment notification failed signature verification.
    Unauthorized(String),
    /// Lifecycle engine error.
    Lifecycle(LifecycleError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Lifecycle(err) => lifecycle_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn lifecycle_error_to_response(err: LifecycleError) -> (StatusCode, String) {
    match &err {
        LifecycleError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        LifecycleError::Conflict { .. } => (StatusCode::CONFLICT, err.to_string()),
        LifecycleError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        LifecycleError::IdempotentAttemptFailed => (StatusCode::CONFLICT, err.to_string()),
        _ => {
            tracing::error!(error = %err, "lifecycle failure");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::Lifecycle(err)
    }
}
