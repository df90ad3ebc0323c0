use crate::engine::LanguageModel;
use crate::GenerationError;

/// Incremental detokenizer for streaming.
///
/// Holds back bytes until they decode to complete characters, so a
/// character split across several tokens is emitted once, whole, with the
/// token that completes it.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one token and return the newly completed text (possibly empty).
    pub fn step<M>(&mut self, model: &M, token: u32) -> Result<String, GenerationError>
    where
        M: LanguageModel + ?Sized,
    {
        let prev_text = if self.tokens.is_empty() {
            String::new()
        } else {
            model.decode(&self.tokens[self.prev_index..self.current_index])?
        };
        self.tokens.push(token);
        let text = model.decode(&self.tokens[self.prev_index..])?;

        if text.len() > prev_text.len() && !text.ends_with(char::REPLACEMENT_CHARACTER) {
            if let Some(fresh) = text.get(prev_text.len()..) {
                let fresh = fresh.to_string();
                self.prev_index = self.current_index;
                self.current_index = self.tokens.len();
                return Ok(fresh);
            }
        }
        Ok(String::new())
    }

    /// Text still held back, decoded lossily. Call once generation has
    /// ended so a cut-off character is not silently dropped.
    pub fn flush<M>(&mut self, model: &M) -> Result<String, GenerationError>
    where
        M: LanguageModel + ?Sized,
    {
        if self.current_index >= self.tokens.len() {
            return Ok(String::new());
        }
        let prev_text = model.decode(&self.tokens[self.prev_index..self.current_index])?;
        let text = model.decode(&self.tokens[self.prev_index..])?;
        let rest = text.get(prev_text.len()..).unwrap_or_default().to_string();
        self.prev_index = self.current_index;
        self.current_index = self.tokens.len();
        Ok(rest)
    }
}
