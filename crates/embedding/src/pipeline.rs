//! Tokenize, pad, encode and reshape.
//!
//! Every input is padded with the pad id to exactly L ids, so every vector
//! has length L x H whatever the input length. The vector is the whole
//! per-token hidden state, flattened, not a pooled sentence embedding.

use onnxruntime::ndarray::ArrayView3;
use tracing::{debug, trace};

use crate::normalize::l2_normalize_in_place;
use crate::onnx::{OnnxEncoder, TextEncoder};
use crate::tokenizer::{HfTokenizer, TextTokenizer};
use crate::{EmbeddingConfig, EmbeddingError};

/// Flattened `[L, H]` hidden state for one input.
pub type EmbeddingVector = Vec<f32>;

/// Per-request switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddingOptions {
    /// Scale each vector to unit L2 norm.
    pub normalize: bool,
    /// Cut sequences longer than L instead of rejecting them.
    pub truncate: bool,
}

pub struct EmbeddingPipeline {
    tokenizer: Box<dyn TextTokenizer>,
    encoder: Box<dyn TextEncoder>,
    config: EmbeddingConfig,
}

impl EmbeddingPipeline {
    pub fn new(
        tokenizer: Box<dyn TextTokenizer>,
        encoder: Box<dyn TextEncoder>,
        config: EmbeddingConfig,
    ) -> Result<Self, EmbeddingError> {
        config.validate()?;
        Ok(Self {
            tokenizer,
            encoder,
            config,
        })
    }

    /// Load the tokenizer and ONNX encoder named by `config`.
    pub fn load(config: EmbeddingConfig) -> Result<Self, EmbeddingError> {
        config.validate()?;
        let encoder = OnnxEncoder::load(&config.encoder_model_path, &config.input_name)?;
        let tokenizer = HfTokenizer::from_file(&config.tokenizer_model_path)?;
        Self::new(Box::new(tokenizer), Box::new(encoder), config)
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Token ids for `text`, cast to i32 and padded to exactly L.
    pub fn prepare_ids(&self, text: &str, truncate: bool) -> Result<Vec<i32>, EmbeddingError> {
        let max = self.config.max_sequence_length;
        let mut ids = self
            .tokenizer
            .tokenize(text)?
            .into_iter()
            .map(|id| {
                i32::try_from(id)
                    .map_err(|_| EmbeddingError::Inference(format!("token id {id} out of i32 range")))
            })
            .collect::<Result<Vec<i32>, _>>()?;

        if ids.len() > max {
            if !truncate {
                return Err(EmbeddingError::SequenceTooLong {
                    len: ids.len(),
                    max,
                });
            }
            trace!(len = ids.len(), max, "truncating embedding input");
            ids.truncate(max);
        }
        pad_to_length(&mut ids, max, self.config.pad_token_id);
        Ok(ids)
    }

    pub fn embed(
        &self,
        text: &str,
        options: EmbeddingOptions,
    ) -> Result<EmbeddingVector, EmbeddingError> {
        let ids = self.prepare_ids(text, options.truncate)?;
        let output = self.encoder.encode(&ids)?;

        let (l, h) = (self.config.max_sequence_length, self.config.hidden_size);
        let mismatch = |detail: String| {
            EmbeddingError::Shape(format!(
                "{:?} ({} values) does not fit [1, {l}, {h}]: {detail}",
                output.shape,
                output.data.len()
            ))
        };
        if output.data.len() != l * h {
            return Err(mismatch("element count differs".into()));
        }
        let hidden = ArrayView3::from_shape((1, l, h), output.data.as_slice())
            .map_err(|e| mismatch(e.to_string()))?;

        let mut vector: EmbeddingVector = hidden.iter().copied().collect();
        if options.normalize {
            l2_normalize_in_place(&mut vector);
        }
        Ok(vector)
    }

    /// One vector per input, computed one input at a time, in input order.
    pub fn embed_batch<S>(
        &self,
        inputs: &[S],
        options: EmbeddingOptions,
    ) -> Result<Vec<EmbeddingVector>, EmbeddingError>
    where
        S: AsRef<str>,
    {
        debug!(
            inputs = inputs.len(),
            normalize = options.normalize,
            truncate = options.truncate,
            "embedding batch"
        );
        inputs
            .iter()
            .map(|text| self.embed(text.as_ref(), options))
            .collect()
    }
}

/// Right-pad `ids` with `pad_id` up to `len`. Never shortens.
pub fn pad_to_length(ids: &mut Vec<i32>, len: usize, pad_id: i32) {
    if ids.len() < len {
        ids.resize(len, pad_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onnx::EncoderOutput;
    use crate::stub::{StubEncoder, StubTokenizer};

    fn config(l: usize, h: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            max_sequence_length: l,
            hidden_size: h,
            pad_token_id: 99,
            ..Default::default()
        }
    }

    fn pipeline(l: usize, h: usize) -> EmbeddingPipeline {
        EmbeddingPipeline::new(
            Box::new(StubTokenizer::default()),
            Box::new(StubEncoder::new(h)),
            config(l, h),
        )
        .unwrap()
    }

    #[test]
    fn pad_fills_tail_to_exact_length() {
        let mut ids = vec![5, 6, 7];
        pad_to_length(&mut ids, 6, 0);
        assert_eq!(ids, vec![5, 6, 7, 0, 0, 0]);

        let mut long = vec![1, 2, 3];
        pad_to_length(&mut long, 2, 0);
        assert_eq!(long, vec![1, 2, 3]);
    }

    #[test]
    fn short_input_is_padded_with_pad_id() {
        let p = pipeline(8, 4);
        let ids = p.prepare_ids("two words", false).unwrap();
        assert_eq!(ids.len(), 8);
        assert!(ids[2..].iter().all(|&id| id == 99));
        assert!(ids[..2].iter().all(|&id| id != 99));
    }

    #[test]
    fn vector_length_is_l_times_h_for_any_input() {
        let p = pipeline(16, 3);
        for text in ["", "a", "a much longer sentence with several words in it"] {
            let v = p.embed(text, EmbeddingOptions::default()).unwrap();
            assert_eq!(v.len(), 16 * 3, "input {text:?}");
        }
    }

    #[test]
    fn long_input_is_rejected_unless_truncation_requested() {
        let p = pipeline(4, 2);
        let text = "one two three four five six";
        assert!(matches!(
            p.embed(text, EmbeddingOptions::default()),
            Err(EmbeddingError::SequenceTooLong { len: 6, max: 4 })
        ));

        let options = EmbeddingOptions {
            truncate: true,
            ..Default::default()
        };
        let v = p.embed(text, options).unwrap();
        assert_eq!(v.len(), 8);
    }

    #[test]
    fn normalize_yields_unit_vector() {
        let p = pipeline(8, 4);
        let options = EmbeddingOptions {
            normalize: true,
            ..Default::default()
        };
        let v = p.embed("hello world", options).unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn batch_preserves_input_order() -> anyhow::Result<()> {
        let p = pipeline(8, 4);
        let inputs = ["alpha", "beta gamma", "delta"];
        let batch = p.embed_batch(&inputs[..], EmbeddingOptions::default())?;
        assert_eq!(batch.len(), 3);
        for (text, vector) in inputs.iter().zip(&batch) {
            assert_eq!(vector, &p.embed(text, EmbeddingOptions::default())?);
        }
        assert_ne!(batch[0], batch[1]);
        Ok(())
    }

    struct WrongShapeEncoder;

    impl TextEncoder for WrongShapeEncoder {
        fn encode(&self, ids: &[i32]) -> Result<EncoderOutput, EmbeddingError> {
            Ok(EncoderOutput {
                shape: vec![1, ids.len()],
                data: vec![0.0; ids.len()],
            })
        }
    }

    #[test]
    fn output_that_cannot_be_reshaped_is_an_error() {
        let p = EmbeddingPipeline::new(
            Box::new(StubTokenizer::default()),
            Box::new(WrongShapeEncoder),
            config(8, 4),
        )
        .unwrap();
        assert!(matches!(
            p.embed("x", EmbeddingOptions::default()),
            Err(EmbeddingError::Shape(_))
        ));
    }

    #[test]
    fn load_fails_fast_on_missing_encoder() {
        let cfg = EmbeddingConfig {
            encoder_model_path: "/missing/encoder.onnx".into(),
            tokenizer_model_path: "/missing/tokenizer.json".into(),
            ..Default::default()
        };
        assert!(matches!(
            EmbeddingPipeline::load(cfg),
            Err(EmbeddingError::ModelNotFound(_))
        ));
    }
}
