use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use polifund_chain::ChainError;
use polifund_shared::Lang;
use polifund_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Too many requests")]
    RateLimited,

    #[error("Chain access is not configured")]
    ChainUnavailable,

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Image storage error: {0}")]
    ImageStorage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Task(msg) => ServerError::Internal(format!("store task failed: {msg}")),
            other => ServerError::Store(other),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            ServerError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            ServerError::ChainUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ServerError::Chain(ChainError::Revert(reason)) => {
                (StatusCode::BAD_REQUEST, reason.user_message(Lang::Pl))
            }
            ServerError::Chain(ChainError::Unsupported { operation, .. }) => (
                StatusCode::NOT_IMPLEMENTED,
                format!("{operation} is not available on this deployment"),
            ),
            ServerError::Chain(e) => {
                tracing::warn!(error = %e, "Chain read failed");
                (StatusCode::SERVICE_UNAVAILABLE, "Blockchain node unavailable".to_string())
            }
            ServerError::Store(StoreError::NotFound) => {
                (StatusCode::NOT_FOUND, "Record not found".to_string())
            }
            ServerError::Store(_) | ServerError::ImageStorage(_) | ServerError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
