//! Engine seam: what the orchestrator needs from a generative model.

use crate::options::SearchOptions;
use crate::GenerationError;

/// Token ids produced by encoding a prompt. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSequence(Vec<u32>);

impl TokenSequence {
    pub fn new(ids: Vec<u32>) -> Result<Self, GenerationError> {
        if ids.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        Ok(Self(ids))
    }

    pub fn ids(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Input and option table for one generation.
#[derive(Debug, Clone)]
pub struct GeneratorParams {
    pub input: TokenSequence,
    pub options: SearchOptions,
}

impl GeneratorParams {
    pub fn new(input: TokenSequence, options: SearchOptions) -> Self {
        Self { input, options }
    }
}

/// Step-wise generation state for a single sequence.
///
/// Callers alternate `compute_logits` and `generate_next_token` until
/// `is_done` reports true; `sequence` holds prompt and generated ids.
pub trait TokenGenerator: Send {
    fn is_done(&self) -> bool;

    fn compute_logits(&mut self) -> Result<(), GenerationError>;

    fn generate_next_token(&mut self) -> Result<u32, GenerationError>;

    fn sequence(&self) -> &[u32];
}

/// A loaded generative model together with its tokenizer.
pub trait LanguageModel: Send + Sync + 'static {
    fn encode(&self, text: &str) -> Result<Vec<u32>, GenerationError>;

    fn decode(&self, tokens: &[u32]) -> Result<String, GenerationError>;

    /// Configure a generator. Rejected options fail here.
    fn generator(&self, params: GeneratorParams)
        -> Result<Box<dyn TokenGenerator>, GenerationError>;

    /// Run a generator to completion and return the full output sequence.
    fn generate(&self, params: GeneratorParams) -> Result<Vec<u32>, GenerationError> {
        let mut generator = self.generator(params)?;
        while !generator.is_done() {
            generator.compute_logits()?;
            generator.generate_next_token()?;
        }
        Ok(generator.sequence().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_sequence_is_rejected() {
        assert!(matches!(
            TokenSequence::new(Vec::new()),
            Err(GenerationError::EmptyPrompt)
        ));
    }

    #[test]
    fn token_sequence_keeps_ids_in_order() {
        let seq = TokenSequence::new(vec![3, 1, 2]).unwrap();
        assert_eq!(seq.ids(), &[3, 1, 2]);
        assert_eq!(seq.len(), 3);
        assert!(!seq.is_empty());
    }
}
