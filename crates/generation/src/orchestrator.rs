//! Drives a shared model handle through batch or streaming generation.
//!
//! One generation at a time per handle: generation holds the handle's write
//! lock for its whole lifetime, tokenization takes the read side. Compute
//! always runs on the blocking pool; a streaming generation dispatches each
//! step as its own blocking task and hands chunks to the caller through a
//! bounded channel, so writing a chunk out never waits on the next step.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, trace, warn};

use crate::decode::StreamDecoder;
use crate::engine::{GeneratorParams, LanguageModel, TokenGenerator, TokenSequence};
use crate::GenerationError;

/// Chunks buffered between the compute task and the consumer.
const STREAM_BUFFER: usize = 32;

/// One streamed fragment: the text completed by exactly one generated token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedChunk {
    pub index: usize,
    pub token_id: u32,
    pub text: String,
}

/// Result of a batch generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GeneratedChunk, GenerationError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Configuring,
    Running,
    Streaming,
    Completed,
    Failed,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationState::Configuring => "configuring",
            GenerationState::Running => "running",
            GenerationState::Streaming => "streaming",
            GenerationState::Completed => "completed",
            GenerationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Logs wall time of a scope at trace level when dropped.
struct Measurement {
    label: &'static str,
    started: Instant,
}

impl Measurement {
    fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
        }
    }
}

impl Drop for Measurement {
    fn drop(&mut self) {
        trace!(
            scope = self.label,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "measurement"
        );
    }
}

type SharedModel = Arc<RwLock<Box<dyn LanguageModel>>>;

/// Process-wide handle to one loaded model. Cheap to clone.
#[derive(Clone)]
pub struct ModelHandle {
    model: SharedModel,
}

impl ModelHandle {
    pub fn new<M: LanguageModel>(model: M) -> Self {
        Self::from_boxed(Box::new(model))
    }

    pub fn from_boxed(model: Box<dyn LanguageModel>) -> Self {
        Self {
            model: Arc::new(RwLock::new(model)),
        }
    }

    pub async fn encode(&self, text: String) -> Result<TokenSequence, GenerationError> {
        let model = Arc::clone(&self.model).read_owned().await;
        let ids = tokio::task::spawn_blocking(move || model.encode(&text)).await??;
        TokenSequence::new(ids)
    }

    pub async fn decode(&self, tokens: Vec<u32>) -> Result<String, GenerationError> {
        let model = Arc::clone(&self.model).read_owned().await;
        tokio::task::spawn_blocking(move || model.decode(&tokens)).await?
    }

    /// Run to completion and decode the output in one piece.
    ///
    /// The text is the generated part only, unless the `return_full_text`
    /// option is true, in which case the whole output sequence (prompt
    /// included) is decoded.
    pub async fn generate(&self, params: GeneratorParams) -> Result<Completion, GenerationError> {
        let model = Arc::clone(&self.model).write_owned().await;
        let prompt_tokens = params.input.len();
        let full_text = params.options.bool("return_full_text")?.unwrap_or(false);

        let outcome = tokio::task::spawn_blocking(move || {
            let _measurement = Measurement::start("batch_generation");
            debug!(state = %GenerationState::Configuring, prompt_tokens, "generation");
            let mut generator = model.generator(params)?;
            debug!(state = %GenerationState::Running, "generation");
            while !generator.is_done() {
                generator.compute_logits()?;
                generator.generate_next_token()?;
            }
            let sequence = generator.sequence();
            let generated = sequence.get(prompt_tokens..).unwrap_or_default();
            let text = model.decode(if full_text { sequence } else { generated })?;
            Ok::<_, GenerationError>(Completion {
                text,
                prompt_tokens,
                completion_tokens: generated.len(),
            })
        })
        .await
        .map_err(GenerationError::from)
        .and_then(|r| r);

        match &outcome {
            Ok(c) => debug!(
                state = %GenerationState::Completed,
                completion_tokens = c.completion_tokens,
                "generation"
            ),
            Err(e) => debug!(state = %GenerationState::Failed, error = %e, "generation"),
        }
        outcome
    }

    /// Configure a generator and return a stream of one chunk per token.
    ///
    /// Option rejection surfaces here, before any chunk exists. The handle
    /// stays locked until the stream finishes, fails, or is dropped.
    pub async fn stream(&self, params: GeneratorParams) -> Result<ChunkStream, GenerationError> {
        let model = Arc::clone(&self.model).write_owned().await;

        let session = tokio::task::spawn_blocking(move || {
            debug!(state = %GenerationState::Configuring, prompt_tokens = params.input.len(), "generation");
            match model.generator(params) {
                Ok(generator) => Ok(StreamingSession {
                    model,
                    generator,
                    decoder: StreamDecoder::new(),
                    index: 0,
                }),
                Err(e) => {
                    debug!(state = %GenerationState::Failed, error = %e, "generation");
                    Err(e)
                }
            }
        })
        .await??;

        let (tx, mut rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(produce(session, tx));

        Ok(Box::pin(async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }))
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}

/// Everything one streaming generation owns; dropped as a unit.
struct StreamingSession {
    model: OwnedRwLockWriteGuard<Box<dyn LanguageModel>>,
    generator: Box<dyn TokenGenerator>,
    decoder: StreamDecoder,
    index: usize,
}

impl StreamingSession {
    fn step(&mut self) -> Result<GeneratedChunk, GenerationError> {
        self.generator.compute_logits()?;
        let token_id = self.generator.generate_next_token()?;
        let mut text = self.decoder.step(&**self.model, token_id)?;
        if self.generator.is_done() {
            // A limit can cut a character short; the last chunk carries what is left.
            text.push_str(&self.decoder.flush(&**self.model)?);
        }
        let chunk = GeneratedChunk {
            index: self.index,
            token_id,
            text,
        };
        self.index += 1;
        Ok(chunk)
    }
}

async fn produce(
    session: StreamingSession,
    tx: mpsc::Sender<Result<GeneratedChunk, GenerationError>>,
) {
    debug!(state = %GenerationState::Streaming, "generation");
    let mut session = session;
    loop {
        if session.generator.is_done() {
            debug!(state = %GenerationState::Completed, chunks = session.index, "generation");
            return;
        }

        let joined = tokio::task::spawn_blocking(move || {
            let result = session.step();
            (session, result)
        })
        .await;

        match joined {
            Ok((next, Ok(chunk))) => {
                session = next;
                if tx.send(Ok(chunk)).await.is_err() {
                    warn!(chunks = session.index, "stream consumer went away, stopping generation");
                    return;
                }
            }
            Ok((_, Err(e))) => {
                debug!(state = %GenerationState::Failed, error = %e, "generation");
                let _ = tx.send(Err(e)).await;
                return;
            }
            Err(join) => {
                debug!(state = %GenerationState::Failed, error = %join, "generation");
                let _ = tx.send(Err(join.into())).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SearchOptions;
    use crate::stub::ScriptedModel;
    use futures::StreamExt;
    use std::time::Duration;

    async fn params(handle: &ModelHandle, prompt: &str, options: SearchOptions) -> GeneratorParams {
        let input = handle.encode(prompt.to_string()).await.unwrap();
        GeneratorParams::new(input, options)
    }

    #[tokio::test]
    async fn batch_returns_one_decoded_completion() {
        let handle = ModelHandle::new(ScriptedModel::new("Hi there"));
        let p = params(&handle, "prompt", SearchOptions::new()).await;
        let completion = handle.generate(p).await.unwrap();
        assert_eq!(completion.text, "Hi there");
        assert_eq!(completion.prompt_tokens, 6);
        assert_eq!(completion.completion_tokens, 8);
    }

    #[tokio::test]
    async fn stream_emits_one_chunk_per_token_in_order() {
        let handle = ModelHandle::new(ScriptedModel::new("abcd"));
        let p = params(&handle, "q", SearchOptions::new()).await;
        let chunks: Vec<GeneratedChunk> = handle
            .stream(p)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 4);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
        let text: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(text, "abcd");
    }

    #[tokio::test]
    async fn stream_reassembles_multibyte_text() {
        let reply = "żółw 🐢";
        let handle = ModelHandle::new(ScriptedModel::new(reply));
        let p = params(&handle, "q", SearchOptions::new()).await;
        let chunks: Vec<GeneratedChunk> = handle
            .stream(p)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), reply.len());
        let text: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(text, reply);
    }

    #[tokio::test]
    async fn rejected_option_fails_before_stream_starts() {
        let handle = ModelHandle::new(ScriptedModel::new("x"));
        let mut options = SearchOptions::new();
        options.set("max_length", 0_i64);
        let p = params(&handle, "q", options).await;
        assert!(matches!(
            handle.stream(p).await.err(),
            Some(GenerationError::InvalidOption { .. })
        ));
    }

    #[tokio::test]
    async fn failed_generation_releases_handle() {
        let handle = ModelHandle::new(ScriptedModel::new("ok"));
        let mut options = SearchOptions::new();
        options.set("temperature", -2.0_f64);
        let p = params(&handle, "q", options).await;
        assert!(handle.generate(p).await.is_err());

        let p = params(&handle, "q", SearchOptions::new()).await;
        let completion = tokio::time::timeout(Duration::from_secs(2), handle.generate(p))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completion.text, "ok");
    }

    #[tokio::test]
    async fn generations_on_one_handle_are_serialized() {
        let handle = ModelHandle::new(ScriptedModel::new(&"x".repeat(100)));
        let p = params(&handle, "q", SearchOptions::new()).await;
        let mut stream = handle.stream(p).await.unwrap();
        assert!(stream.next().await.is_some());

        let p = params_unlocked("q");
        let blocked = tokio::time::timeout(Duration::from_millis(50), handle.generate(p.clone())).await;
        assert!(blocked.is_err(), "second generation ran while stream held the handle");

        drop(stream);
        let completion = tokio::time::timeout(Duration::from_secs(2), handle.generate(p))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completion.completion_tokens, 100);
    }

    #[tokio::test]
    async fn return_full_text_decodes_prompt_and_completion() {
        let handle = ModelHandle::new(ScriptedModel::new("ok"));
        let p = params(&handle, "Q: ", SearchOptions::new()).await;
        assert_eq!(handle.generate(p).await.unwrap().text, "ok");

        let mut options = SearchOptions::new();
        options.set("return_full_text", true);
        let p = params(&handle, "Q: ", options).await;
        let completion = handle.generate(p).await.unwrap();
        assert_eq!(completion.text, "Q: ok");
        assert_eq!(completion.completion_tokens, 2);
    }

    #[tokio::test]
    async fn stream_cut_mid_character_matches_batch_text() {
        let handle = ModelHandle::new(ScriptedModel::new("aé"));
        let mut options = SearchOptions::new();
        options.set("max_length", 3_i64);

        let p = params(&handle, "q", options.clone()).await;
        let batch = handle.generate(p).await.unwrap();
        assert_eq!(batch.text, "a\u{FFFD}");

        let p = params(&handle, "q", options).await;
        let chunks: Vec<GeneratedChunk> = handle
            .stream(p)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), batch.completion_tokens);
        let text: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(text, batch.text);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_at_encode() {
        let handle = ModelHandle::new(ScriptedModel::new("x"));
        assert!(matches!(
            handle.encode(String::new()).await,
            Err(GenerationError::EmptyPrompt)
        ));
    }

    // Built without the handle: encoding would wait behind the held write lock.
    fn params_unlocked(prompt: &str) -> GeneratorParams {
        let ids = prompt.bytes().map(u32::from).collect();
        GeneratorParams::new(TokenSequence::new(ids).unwrap(), SearchOptions::new())
    }
}
