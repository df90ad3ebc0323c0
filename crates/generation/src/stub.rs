//! Deterministic stand-in engine.
//!
//! Tokenizes text to its UTF-8 bytes and answers every prompt with the same
//! scripted reply, one byte per generated token. Useful wherever a real
//! model would be too slow or unavailable, such as tests.

use std::sync::Mutex;

use crate::engine::{GeneratorParams, LanguageModel, TokenGenerator};
use crate::options::SearchOptions;
use crate::GenerationError;

pub struct ScriptedModel {
    reply: Vec<u32>,
    last_options: Mutex<Option<SearchOptions>>,
}

impl ScriptedModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.bytes().map(u32::from).collect(),
            last_options: Mutex::new(None),
        }
    }

    /// Option table of the most recently configured generator.
    pub fn last_options(&self) -> Option<SearchOptions> {
        self.last_options
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(None)
    }
}

impl LanguageModel for ScriptedModel {
    fn encode(&self, text: &str) -> Result<Vec<u32>, GenerationError> {
        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, GenerationError> {
        let bytes = tokens
            .iter()
            .map(|&t| {
                u8::try_from(t).map_err(|_| GenerationError::Tokenizer(format!("unknown token {t}")))
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn generator(
        &self,
        params: GeneratorParams,
    ) -> Result<Box<dyn TokenGenerator>, GenerationError> {
        let max_length = match params.options.int("max_length")? {
            Some(n) if n <= 0 => {
                return Err(GenerationError::invalid_option(
                    "max_length",
                    "must be positive",
                ))
            }
            Some(n) => Some(n as usize),
            None => None,
        };
        if let Some(t) = params.options.float("temperature")? {
            if t < 0.0 {
                return Err(GenerationError::invalid_option(
                    "temperature",
                    "must not be negative",
                ));
            }
        }
        if let Ok(mut last) = self.last_options.lock() {
            *last = Some(params.options.clone());
        }

        Ok(Box::new(ScriptedGenerator {
            sequence: params.input.ids().to_vec(),
            prompt_len: params.input.len(),
            reply: self.reply.clone(),
            max_length,
            logits_ready: false,
        }))
    }
}

struct ScriptedGenerator {
    sequence: Vec<u32>,
    prompt_len: usize,
    reply: Vec<u32>,
    max_length: Option<usize>,
    logits_ready: bool,
}

impl TokenGenerator for ScriptedGenerator {
    fn is_done(&self) -> bool {
        let produced = self.sequence.len() - self.prompt_len;
        produced >= self.reply.len()
            || self
                .max_length
                .is_some_and(|max| self.sequence.len() >= max)
    }

    fn compute_logits(&mut self) -> Result<(), GenerationError> {
        self.logits_ready = true;
        Ok(())
    }

    fn generate_next_token(&mut self) -> Result<u32, GenerationError> {
        if !self.logits_ready {
            return Err(GenerationError::Engine(
                "generate_next_token called before compute_logits".into(),
            ));
        }
        let produced = self.sequence.len() - self.prompt_len;
        let token = *self
            .reply
            .get(produced)
            .ok_or_else(|| GenerationError::Engine("generation already finished".into()))?;
        self.sequence.push(token);
        self.logits_ready = false;
        Ok(token)
    }

    fn sequence(&self) -> &[u32] {
        &self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TokenSequence;

    fn params(prompt: &str, options: SearchOptions) -> GeneratorParams {
        let model = ScriptedModel::new("");
        let ids = model.encode(prompt).unwrap();
        GeneratorParams::new(TokenSequence::new(ids).unwrap(), options)
    }

    #[test]
    fn generate_appends_reply_to_prompt() {
        let model = ScriptedModel::new("ok");
        let out = model.generate(params("hi", SearchOptions::new())).unwrap();
        assert_eq!(model.decode(&out).unwrap(), "hiok");
    }

    #[test]
    fn max_length_caps_total_sequence() {
        let model = ScriptedModel::new("abcdef");
        let mut options = SearchOptions::new();
        options.set("max_length", 4_i64);
        let out = model.generate(params("hi", options)).unwrap();
        assert_eq!(model.decode(&out).unwrap(), "hiab");
    }

    #[test]
    fn negative_temperature_is_rejected() {
        let model = ScriptedModel::new("x");
        let mut options = SearchOptions::new();
        options.set("temperature", -1.0_f64);
        let err = model.generator(params("p", options)).err().unwrap();
        assert!(matches!(err, GenerationError::InvalidOption { .. }));
    }

    #[test]
    fn records_last_options() {
        let model = ScriptedModel::new("x");
        let mut options = SearchOptions::new();
        options.set("seed", 9_i64);
        model.generate(params("p", options.clone())).unwrap();
        assert_eq!(model.last_options(), Some(options));
    }
}
