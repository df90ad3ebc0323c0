use embedding::EmbeddingConfig;
use generation::LanguageModelConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Metrics endpoint enabled
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// System prompt heading every generation prompt
    #[serde(default)]
    pub system_prompt: String,

    #[serde(default)]
    pub language_model: LanguageModelConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            system_prompt: String::new(),
            language_model: LanguageModelConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `appsettings` file and
    /// `HF_LOCAL__*` environment variables, in increasing precedence.
    pub fn load() -> anyhow::Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err.into());
            }
        }

        let builder = config::Config::builder()
            .add_source(config::File::with_name("appsettings").required(false))
            .add_source(config::Environment::with_prefix("HF_LOCAL").separator("__"));

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.system_prompt.trim().is_empty() {
            anyhow::bail!("system_prompt is required (HF_LOCAL__SYSTEM_PROMPT)");
        }
        self.embedding.validate()?;
        Ok(())
    }

    /// Every model artifact that must exist before the server may start.
    pub fn required_model_files(&self) -> Vec<PathBuf> {
        vec![
            self.language_model.model_path.clone(),
            self.language_model.resolved_tokenizer_path(),
            self.embedding.encoder_model_path.clone(),
            self.embedding.tokenizer_model_path.clone(),
        ]
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

// Generation on CPU is slow; batch requests routinely run for minutes.
fn default_timeout_secs() -> u64 {
    300
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}
