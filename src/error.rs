use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failure taxonomy exposed to callers. Every backend-level error is
/// converted into one of these before it reaches the transport layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    InvalidArgument(String),
    #[error("model is not ready")]
    ServiceUnavailable,
    #[error("service is overloaded, retry later")]
    Overloaded,
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ServiceError::ServiceUnavailable | ServiceError::Overloaded => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::GenerationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
