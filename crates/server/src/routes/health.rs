use crate::state::{ServerMetadata, ServerState};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

/// Global server start time for uptime calculation
static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Health check endpoint (liveness)
/// Returns 200 if server is running
pub async fn health_check() -> impl IntoResponse {
    let metadata = ServerMetadata {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime_seconds(),
    };

    Json(json!({
        "status": "healthy",
        "service": "hf-local-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": metadata.version,
        "uptime_seconds": metadata.uptime_seconds,
    }))
}

/// Readiness check endpoint
///
/// Models are loaded before the listener binds, so a server that answers at
/// all is ready; the component list reports what was loaded.
pub async fn readiness_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let embedding = state.inference.embedding_config();

    Json(json!({
        "status": "ready",
        "service": "hf-local-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
        "components": {
            "language_model": state.inference.model_name(),
            "embedding": {
                "max_sequence_length": embedding.max_sequence_length,
                "hidden_size": embedding.hidden_size,
            },
        }
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
