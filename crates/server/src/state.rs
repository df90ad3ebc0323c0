use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use hf_local::Inference;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Loaded models, shared by every request
    pub inference: Arc<Inference>,

    /// Prometheus recorder handle, when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
}

impl ServerState {
    pub fn new(config: ServerConfig, inference: Inference) -> Self {
        Self {
            config: Arc::new(config),
            inference: Arc::new(inference),
            metrics: None,
        }
    }

    /// Load every configured model. Any missing file is logged with its
    /// path and aborts startup.
    pub fn load(config: ServerConfig) -> ServerResult<Self> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        ensure_model_files(&config)?;

        let inference = Inference::load(
            &config.system_prompt,
            config.language_model.clone(),
            config.embedding.clone(),
        )?;
        Ok(Self::new(config, inference))
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Fail fast on the first configured model artifact that does not exist.
pub fn ensure_model_files(config: &ServerConfig) -> ServerResult<()> {
    for path in config.required_model_files() {
        if !path.exists() {
            tracing::error!(path = %path.display(), "required model file does not exist");
            return Err(ServerError::ModelFileMissing(path.display().to_string()));
        }
    }
    Ok(())
}

/// Server metadata for health checks
#[derive(Debug, serde::Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub uptime_seconds: u64,
}
