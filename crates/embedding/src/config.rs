use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::EmbeddingError;

/// Encoder model pair and the fixed geometry of its input and output.
///
/// # Example
/// ```no_run
/// use embedding::EmbeddingConfig;
///
/// let cfg = EmbeddingConfig {
///     encoder_model_path: "models/clip/text_model.onnx".into(),
///     tokenizer_model_path: "models/clip/tokenizer.json".into(),
///     ..Default::default()
/// };
/// assert_eq!(cfg.max_sequence_length, 77);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// ONNX text encoder.
    #[serde(default)]
    pub encoder_model_path: PathBuf,
    /// `tokenizer.json` matching the encoder's vocabulary.
    #[serde(default)]
    pub tokenizer_model_path: PathBuf,
    /// Fixed input length L every sequence is padded to.
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,
    /// Hidden size H of the encoder output.
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_pad_token_id")]
    pub pad_token_id: i32,
    /// Name of the encoder's id input.
    #[serde(default = "default_input_name")]
    pub input_name: String,
}

fn default_max_sequence_length() -> usize {
    77
}

fn default_hidden_size() -> usize {
    768
}

fn default_pad_token_id() -> i32 {
    49407
}

fn default_input_name() -> String {
    "input_ids".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            encoder_model_path: PathBuf::new(),
            tokenizer_model_path: PathBuf::new(),
            max_sequence_length: default_max_sequence_length(),
            hidden_size: default_hidden_size(),
            pad_token_id: default_pad_token_id(),
            input_name: default_input_name(),
        }
    }
}

impl EmbeddingConfig {
    /// Length of every emitted vector: L x H.
    pub fn embedding_len(&self) -> usize {
        self.max_sequence_length * self.hidden_size
    }

    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.max_sequence_length == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "max_sequence_length must be positive".into(),
            ));
        }
        if self.hidden_size == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "hidden_size must be positive".into(),
            ));
        }
        if self.input_name.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig(
                "input_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_clip_text_encoder() {
        let cfg = EmbeddingConfig::default();
        assert_eq!(cfg.max_sequence_length, 77);
        assert_eq!(cfg.hidden_size, 768);
        assert_eq!(cfg.pad_token_id, 49407);
        assert_eq!(cfg.input_name, "input_ids");
        assert_eq!(cfg.embedding_len(), 77 * 768);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_geometry_is_rejected() {
        let cfg = EmbeddingConfig {
            hidden_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(EmbeddingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: EmbeddingConfig = serde_json::from_str(
            r#"{"encoder_model_path": "enc.onnx", "tokenizer_model_path": "tok.json", "hidden_size": 512}"#,
        )
        .unwrap();
        assert_eq!(cfg.hidden_size, 512);
        assert_eq!(cfg.max_sequence_length, 77);
        assert_eq!(cfg.encoder_model_path, PathBuf::from("enc.onnx"));
    }
}
