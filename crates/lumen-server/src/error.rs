use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use lumen_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upload too large: {size} bytes (max {max})")]
    UploadTooLarge { size: usize, max: usize },

    #[error("Upload storage error: {0}")]
    Upload(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServerError::NotFound("Record not found".into()),
            StoreError::Conflict(msg) => ServerError::Conflict(msg),
            StoreError::InvalidInput(msg) => ServerError::BadRequest(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::UploadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::Upload(detail) => {
                tracing::error!(error = %detail, "Upload storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Upload storage error".to_string())
            }
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
