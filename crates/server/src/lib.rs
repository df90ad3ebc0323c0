//! hf-local server: HTTP API for local text generation and feature extraction
//!
//! Exposes a GGUF language model and an ONNX text encoder, both loaded once
//! at startup, behind request shapes that mirror the hosted inference APIs:
//!
//! - **Text generation**: `POST /models/{name}`, batch or server-sent events
//! - **Chat completion**: `POST /v1/chat/completions`, batch or server-sent events
//! - **Feature extraction**: `POST /pipeline/feature-extraction/{name}`
//! - **Health & Metrics**: liveness/readiness checks and Prometheus text
//!
//! Configuration comes from `.env`, an optional `appsettings` file and
//! `HF_LOCAL__*` environment variables. Startup fails before binding when
//! any configured model file is missing.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
