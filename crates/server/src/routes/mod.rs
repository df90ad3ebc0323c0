//! API route handlers
//!
//! Routes are organized by functionality:
//!
//! - `health`: Health checks, readiness, and metrics
//! - `generate`: Text generation (`/models/{name}`)
//! - `chat`: Chat completion (`/v1/chat/completions`)
//! - `embeddings`: Feature extraction (`/pipeline/feature-extraction/{name}`)

pub mod chat;
pub mod embeddings;
pub mod generate;
pub mod health;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::time::Instant;

/// API version and base info
///
/// Returns server information including version and available endpoints.
/// This is the root endpoint (GET /).
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "hf-local",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/models/{name}",
            "/v1/chat/completions",
            "/pipeline/feature-extraction/{name}",
            "/health",
            "/ready",
            "/metrics"
        ]
    })))
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}

pub(crate) fn record_request(endpoint: &'static str, stream: bool) {
    let mode = if stream { "stream" } else { "batch" };
    metrics::counter!("generation_requests_total", "endpoint" => endpoint, "mode" => mode)
        .increment(1);
}

pub(crate) fn record_failure(endpoint: &'static str) {
    metrics::counter!("request_failures_total", "endpoint" => endpoint).increment(1);
}

pub(crate) fn record_generation(started: Instant, tokens: usize) {
    metrics::counter!("generated_tokens_total").increment(tokens as u64);
    metrics::histogram!("generation_seconds").record(started.elapsed().as_secs_f64());
}
