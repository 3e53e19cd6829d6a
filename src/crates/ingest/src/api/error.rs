//! API error mapping

use crate::error::ServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors returned to API clients
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
    Unavailable(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::TaskNotFound(id) => ApiError::NotFound(format!("task not found: {id}")),
            ServiceError::Enqueue(message) => ApiError::BadRequest(message),
            ServiceError::ShuttingDown => ApiError::Unavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
            ApiError::Unavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
            }
            ApiError::Internal(message) => {
                tracing::error!(message = %message, "internal api error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        };
        let body = Json(json!({
            "status": "error",
            "error_code": code,
            "message": message,
        }));
        (status, body).into_response()
    }
}
