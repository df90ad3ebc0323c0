use std::io;
use thiserror::Error;

/// Errors surfaced by the feature-extraction pipeline.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The encoder model file does not exist.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// The tokenizer file does not exist.
    #[error("tokenizer missing: {0}")]
    TokenizerMissing(String),
    /// Configuration is inconsistent (zero lengths, unusable input name).
    #[error("invalid embedding config: {0}")]
    InvalidConfig(String),
    /// Input tokenized to more ids than the encoder accepts and truncation was not requested.
    #[error("input tokenized to {len} ids, longer than the maximum of {max}")]
    SequenceTooLong { len: usize, max: usize },
    /// Encoder output could not be viewed as `[1, L, H]`.
    #[error("unexpected encoder output shape: {0}")]
    Shape(String),
    /// ONNX Runtime or tokenizer failures.
    #[error("inference failure: {0}")]
    Inference(String),
    /// Low-level IO failures while touching the filesystem.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl EmbeddingError {
    /// Whether the failure was caused by the request rather than the runtime.
    pub fn is_client_error(&self) -> bool {
        matches!(self, EmbeddingError::SequenceTooLong { .. })
    }
}
