//! Server initialization and routing
//!
//! This module handles the Axum server setup including:
//! - Router configuration with all API endpoints
//! - Middleware stack (logging, compression, timeout, etc.)
//! - Fail-fast model loading and graceful shutdown

use crate::config::ServerConfig;
use crate::middleware::{log_requests, request_id};
use crate::routes::{api_info, not_found};
use crate::routes::{chat, embeddings, generate, health};
use crate::state::ServerState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes and middleware
///
/// Middleware stack (applied in reverse order):
/// 1. Request ID tracking, outside the access log so it can report the id
/// 2. Access logging
/// 3. Timeout handling
/// 4. Compression
/// 5. CORS
/// 6. Body size limit
pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let operational_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics));

    let inference_routes = Router::new()
        .route("/models/{name}", post(generate::generate))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route(
            "/pipeline/feature-extraction/{name}",
            post(embeddings::feature_extraction),
        )
        .layer(DefaultBodyLimit::max(state.config.max_body_size()));

    Router::new()
        .merge(operational_routes)
        .merge(inference_routes)
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the hf-local HTTP server
///
/// Loads every configured model before binding, so a missing model file
/// ends the process with an error before any request is accepted. Blocks
/// until the server is shut down via SIGTERM or Ctrl+C; the models are
/// dropped once when it returns.
///
/// # Example
///
/// ```rust,no_run
/// use server::ServerConfig;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig::load()?;
///     server::start_server(config).await?;
///     Ok(())
/// }
/// ```
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_str())
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .init();

    let addr: SocketAddr = config.socket_addr()?;
    let metrics_enabled = config.metrics_enabled;

    // Model loading reads large files; keep it off the async workers.
    let mut state = tokio::task::spawn_blocking(move || ServerState::load(config))
        .await?
        .map_err(|e| anyhow::anyhow!("startup failed: {e}"))?;

    if metrics_enabled {
        let handle = PrometheusBuilder::new().install_recorder()?;
        state = state.with_metrics(handle);
    }

    let config = Arc::clone(&state.config);
    let app = build_router(Arc::new(state));

    tracing::info!(
        addr = %addr,
        model = %config.language_model.model_path.display(),
        encoder = %config.embedding.encoder_model_path.display(),
        "Starting hf-local server"
    );
    tracing::info!(
        "Timeout: {}s, Max body: {}MB",
        config.timeout_secs,
        config.max_body_size_mb
    );
    tracing::info!(
        "CORS: {}, Metrics: {}",
        config.enable_cors,
        config.metrics_enabled
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
