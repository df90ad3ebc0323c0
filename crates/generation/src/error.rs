use std::io;
use thiserror::Error;

/// Errors surfaced while preparing or running a generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A model or tokenizer file required at load time does not exist.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// The engine rejected a configured search option (unknown key, wrong kind, or out of domain).
    #[error("invalid search option `{key}`: {reason}")]
    InvalidOption { key: String, reason: String },
    /// Generation was asked to start from an empty token sequence.
    #[error("prompt encoded to an empty token sequence")]
    EmptyPrompt,
    /// Tokenizer encode/decode failures.
    #[error("tokenizer failure: {0}")]
    Tokenizer(String),
    /// Native engine faults (tensor ops, sampling, resource exhaustion).
    #[error("engine failure: {0}")]
    Engine(String),
    /// A blocking compute task panicked or was cancelled.
    #[error("generation task aborted: {0}")]
    Aborted(String),
    /// Low-level IO failures while loading model files.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl GenerationError {
    pub(crate) fn invalid_option(key: &str, reason: impl Into<String>) -> Self {
        GenerationError::InvalidOption {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<candle_core::Error> for GenerationError {
    fn from(err: candle_core::Error) -> Self {
        GenerationError::Engine(err.to_string())
    }
}

impl From<tokio::task::JoinError> for GenerationError {
    fn from(err: tokio::task::JoinError) -> Self {
        GenerationError::Aborted(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_option_names_key_and_reason() {
        let err = GenerationError::invalid_option("top_p", "must be in (0, 1]");
        let msg = err.to_string();
        assert!(msg.contains("top_p"));
        assert!(msg.contains("must be in (0, 1]"));
    }

    #[test]
    fn model_not_found_includes_path() {
        let err = GenerationError::ModelNotFound("/models/phi3.gguf".into());
        assert!(err.to_string().contains("/models/phi3.gguf"));
    }

    #[test]
    fn io_errors_convert() {
        let err: GenerationError = io::Error::other("disk gone").into();
        assert!(matches!(err, GenerationError::Io(_)));
        assert!(err.to_string().contains("disk gone"));
    }
}
