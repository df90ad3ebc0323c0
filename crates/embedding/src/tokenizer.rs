use std::path::Path;

use tokenizers::Tokenizer;
use tracing::debug;

use crate::EmbeddingError;

/// Text to token ids for the encoder.
pub trait TextTokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<i64>, EmbeddingError>;
}

/// `tokenizer.json` backed tokenizer with padding and truncation switched
/// off; the pipeline owns both.
pub struct HfTokenizer {
    inner: Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, EmbeddingError> {
        if !path.exists() {
            return Err(EmbeddingError::TokenizerMissing(path.display().to_string()));
        }
        let mut inner =
            Tokenizer::from_file(path).map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        inner.with_padding(None);
        inner
            .with_truncation(None)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        debug!(path = %path.display(), vocab = inner.get_vocab_size(true), "embedding tokenizer loaded");
        Ok(Self { inner })
    }
}

impl TextTokenizer for HfTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<i64>, EmbeddingError> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        Ok(encoding.get_ids().iter().map(|&id| i64::from(id)).collect())
    }
}
