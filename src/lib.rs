//! Workspace umbrella crate for hf-local.
//!
//! Re-exports the generation and embedding crates and stitches them into one
//! request-level entry point, [`Inference`]: prompt assembly, encoding,
//! option mapping, generation and decoding for text requests, and the
//! feature-extraction pipeline for embedding requests.
//!
//! The context is built once at startup and shared by reference with every
//! request; the model handles inside it are never re-created per request.

pub use embedding::{
    EmbeddingConfig, EmbeddingError, EmbeddingOptions, EmbeddingPipeline, EmbeddingVector,
    HfTokenizer, OnnxEncoder, TextEncoder, TextTokenizer,
};
pub use generation::{
    CandleEngine, ChatMessage, ChatParameters, ChunkStream, Completion, GeneratedChunk,
    GenerationError, GenerationParameters, GeneratorParams, LanguageModel, LanguageModelConfig,
    MapOptions, ModelHandle, OptionValue, PromptBuilder, SearchOptions, TokenGenerator,
    TokenSequence,
};

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while serving an inference request.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("invalid inference config: {0}")]
    InvalidConfig(String),
    #[error("embedding task aborted: {0}")]
    Aborted(String),
}

impl From<tokio::task::JoinError> for InferenceError {
    fn from(err: tokio::task::JoinError) -> Self {
        InferenceError::Aborted(err.to_string())
    }
}

impl InferenceError {
    /// Whether the request itself, not the runtime, caused the failure.
    pub fn is_client_error(&self) -> bool {
        match self {
            InferenceError::Embedding(err) => err.is_client_error(),
            _ => false,
        }
    }
}

/// A started streaming generation.
pub struct TextStream {
    /// Length of the encoded prompt the chunks continue.
    pub prompt_tokens: usize,
    pub chunks: ChunkStream,
}

/// Process-wide models plus the prompt template they are driven with.
pub struct Inference {
    language_model: ModelHandle,
    model_name: String,
    prompts: PromptBuilder,
    embeddings: Arc<EmbeddingPipeline>,
}

impl Inference {
    pub fn new(
        language_model: ModelHandle,
        model_name: impl Into<String>,
        prompts: PromptBuilder,
        embeddings: EmbeddingPipeline,
    ) -> Self {
        Self {
            language_model,
            model_name: model_name.into(),
            prompts,
            embeddings: Arc::new(embeddings),
        }
    }

    /// Load every model named by the configuration. Fails on the first
    /// missing file.
    pub fn load(
        system_prompt: &str,
        language_model: LanguageModelConfig,
        embedding: EmbeddingConfig,
    ) -> Result<Self, InferenceError> {
        if system_prompt.trim().is_empty() {
            return Err(InferenceError::InvalidConfig(
                "system_prompt must not be empty".into(),
            ));
        }
        let model_name = language_model.model_name();
        let engine = CandleEngine::load(language_model)?;
        let pipeline = EmbeddingPipeline::load(embedding)?;
        info!(model = %model_name, "inference context ready");

        Ok(Self::new(
            ModelHandle::new(engine),
            model_name,
            PromptBuilder::new(system_prompt),
            pipeline,
        ))
    }

    /// Name reported to clients for the language model.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub fn embedding_config(&self) -> &EmbeddingConfig {
        self.embeddings.config()
    }

    pub async fn generate_text(
        &self,
        input: &str,
        parameters: &GenerationParameters,
    ) -> Result<Completion, InferenceError> {
        let prompt = self.prompts.single_turn(input);
        self.complete(prompt, parameters).await
    }

    pub async fn stream_text(
        &self,
        input: &str,
        parameters: &GenerationParameters,
    ) -> Result<TextStream, InferenceError> {
        let prompt = self.prompts.single_turn(input);
        self.stream(prompt, parameters).await
    }

    pub async fn chat(
        &self,
        transcript: &[ChatMessage],
        parameters: &ChatParameters,
    ) -> Result<Completion, InferenceError> {
        let prompt = self.prompts.chat(transcript);
        self.complete(prompt, parameters).await
    }

    pub async fn stream_chat(
        &self,
        transcript: &[ChatMessage],
        parameters: &ChatParameters,
    ) -> Result<TextStream, InferenceError> {
        let prompt = self.prompts.chat(transcript);
        self.stream(prompt, parameters).await
    }

    /// One vector per input, in input order.
    pub async fn embed(
        &self,
        inputs: Vec<String>,
        options: EmbeddingOptions,
    ) -> Result<Vec<EmbeddingVector>, InferenceError> {
        let pipeline = Arc::clone(&self.embeddings);
        let vectors = tokio::task::spawn_blocking(move || {
            pipeline.embed_batch(inputs.as_slice(), options)
        })
        .await??;
        Ok(vectors)
    }

    async fn complete<P: MapOptions>(
        &self,
        prompt: String,
        parameters: &P,
    ) -> Result<Completion, InferenceError> {
        let params = self.prepare(prompt, parameters).await?;
        Ok(self.language_model.generate(params).await?)
    }

    async fn stream<P: MapOptions>(
        &self,
        prompt: String,
        parameters: &P,
    ) -> Result<TextStream, InferenceError> {
        let params = self.prepare(prompt, parameters).await?;
        let prompt_tokens = params.input.len();
        let chunks = self.language_model.stream(params).await?;
        Ok(TextStream {
            prompt_tokens,
            chunks,
        })
    }

    async fn prepare<P: MapOptions>(
        &self,
        prompt: String,
        parameters: &P,
    ) -> Result<GeneratorParams, InferenceError> {
        let input = self.language_model.encode(prompt).await?;
        let options = parameters.to_search_options();
        debug!(
            prompt_tokens = input.len(),
            options = options.len(),
            "generation request prepared"
        );
        Ok(GeneratorParams::new(input, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding::stub::{StubEncoder, StubTokenizer};
    use generation::stub::ScriptedModel;

    fn context(reply: &str) -> Inference {
        let cfg = EmbeddingConfig {
            max_sequence_length: 8,
            hidden_size: 4,
            ..Default::default()
        };
        let pipeline = EmbeddingPipeline::new(
            Box::new(StubTokenizer),
            Box::new(StubEncoder::new(4)),
            cfg,
        )
        .unwrap();
        Inference::new(
            ModelHandle::new(ScriptedModel::new(reply)),
            "scripted",
            PromptBuilder::new("S"),
            pipeline,
        )
    }

    #[tokio::test]
    async fn generate_text_returns_completion() {
        let ctx = context("Hello!");
        let out = ctx
            .generate_text("Hi", &GenerationParameters::default())
            .await
            .unwrap();
        assert_eq!(out.text, "Hello!");
        let prompt = ctx.prompts().single_turn("Hi");
        assert_eq!(out.prompt_tokens, prompt.len());
    }

    #[test]
    fn empty_system_prompt_is_rejected() {
        let err = Inference::load(" ", LanguageModelConfig::default(), EmbeddingConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, InferenceError::InvalidConfig(_)));
    }

    #[test]
    fn missing_model_fails_load() {
        let err = Inference::load(
            "S",
            LanguageModelConfig {
                model_path: "/nope/model.gguf".into(),
                ..Default::default()
            },
            EmbeddingConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            InferenceError::Generation(GenerationError::ModelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn too_long_embedding_input_is_a_client_error() {
        let ctx = context("");
        let err = ctx
            .embed(
                vec!["one two three four five six seven eight nine".into()],
                EmbeddingOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }
}
