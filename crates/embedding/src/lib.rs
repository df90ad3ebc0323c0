//! Feature extraction for hf-local.
//!
//! Text goes through a tokenizer, is padded to the encoder's fixed input
//! length, runs through an ONNX text encoder, and comes back as the full
//! per-token hidden state, flattened. Vectors are not pooled; callers that
//! want one vector per sentence pool client-side.
//!
//! ## Threading notes
//!
//! The tokenizer is shared freely. The ONNX session sits behind a mutex, so
//! concurrent callers take turns on the encoder.
//!
//! ## Quick example
//!
//! ```no_run
//! use embedding::{EmbeddingConfig, EmbeddingOptions, EmbeddingPipeline};
//!
//! let pipeline = EmbeddingPipeline::load(EmbeddingConfig {
//!     encoder_model_path: "models/clip/text_model.onnx".into(),
//!     tokenizer_model_path: "models/clip/tokenizer.json".into(),
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! let vectors = pipeline
//!     .embed_batch(&["a photo of a cat", "a dog"], EmbeddingOptions::default())
//!     .unwrap();
//! assert_eq!(vectors[0].len(), 77 * 768);
//! ```

mod config;
mod error;
mod normalize;
mod onnx;
mod pipeline;
mod tokenizer;

pub mod stub;

pub use config::EmbeddingConfig;
pub use error::EmbeddingError;
pub use onnx::{EncoderOutput, OnnxEncoder, TextEncoder};
pub use pipeline::{pad_to_length, EmbeddingOptions, EmbeddingPipeline, EmbeddingVector};
pub use tokenizer::{HfTokenizer, TextTokenizer};
