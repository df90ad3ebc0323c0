use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hf_local::InferenceError;

pub type ServerResult<T> = Result<T, ServerError>;

/// Body of every internal-error response. Details go to the log only.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Model file not found: {0}")]
    ModelFileMissing(String),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found")]
    NotFound,
}

impl ServerError {
    /// Get HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Inference(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ServerError::ModelFileMissing(_)
            | ServerError::Inference(_)
            | ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, detail = ?self, "request failed");
            return (status, GENERIC_ERROR_MESSAGE).into_response();
        }

        let message = match &self {
            ServerError::Inference(err) => err.to_string(),
            other => other.to_string(),
        };
        tracing::debug!(status = %status, message = %message, "request rejected");
        (status, message).into_response()
    }
}
