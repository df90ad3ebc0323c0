//! Deterministic stand-ins for the tokenizer and encoder.
//!
//! Reproducible vectors with minimal CPU cost and no model files, for tests
//! and for running the service without ONNX assets.

use fxhash::hash64;

use crate::onnx::{EncoderOutput, TextEncoder};
use crate::tokenizer::TextTokenizer;
use crate::EmbeddingError;

const VOCAB: u64 = 49_000;
const FIRST_ID: i64 = 100;

/// One id per whitespace-separated word, derived from a hash of the word.
#[derive(Debug, Clone, Default)]
pub struct StubTokenizer;

impl TextTokenizer for StubTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<i64>, EmbeddingError> {
        Ok(text
            .split_whitespace()
            .map(|word| FIRST_ID + (hash64(word.as_bytes()) % VOCAB) as i64)
            .collect())
    }
}

/// Emits a `[1, L, H]` sinusoid hidden state derived from each id and position.
#[derive(Debug, Clone)]
pub struct StubEncoder {
    hidden_size: usize,
}

impl StubEncoder {
    pub fn new(hidden_size: usize) -> Self {
        Self { hidden_size }
    }
}

impl TextEncoder for StubEncoder {
    fn encode(&self, ids: &[i32]) -> Result<EncoderOutput, EmbeddingError> {
        let mut data = Vec::with_capacity(ids.len() * self.hidden_size);
        for (pos, &id) in ids.iter().enumerate() {
            for dim in 0..self.hidden_size {
                data.push((id as f32 * 0.001 + dim as f32 * 0.1 + pos as f32 * 0.01).sin());
            }
        }
        Ok(EncoderOutput {
            shape: vec![1, ids.len(), self.hidden_size],
            data,
        })
    }
}
