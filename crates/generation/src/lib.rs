//! Text generation for hf-local.
//!
//! Turns chat transcripts into prompts ([`PromptBuilder`]), request parameters
//! into engine search options ([`MapOptions`]), and drives a loaded
//! [`LanguageModel`] through batch or streaming generation ([`ModelHandle`]).
//!
//! ```no_run
//! use generation::{
//!     CandleEngine, GenerationParameters, GeneratorParams, LanguageModelConfig, MapOptions,
//!     ModelHandle, PromptBuilder,
//! };
//!
//! # async fn run() -> Result<(), generation::GenerationError> {
//! let engine = CandleEngine::load(LanguageModelConfig {
//!     model_path: "models/phi-3-mini-q4.gguf".into(),
//!     ..Default::default()
//! })?;
//! let handle = ModelHandle::new(engine);
//!
//! let prompt = PromptBuilder::new("You are a helpful assistant.").single_turn("Hello");
//! let input = handle.encode(prompt).await?;
//! let options = GenerationParameters::default().to_search_options();
//! let completion = handle.generate(GeneratorParams::new(input, options)).await?;
//! println!("{}", completion.text);
//! # Ok(())
//! # }
//! ```

mod candle;
mod config;
mod decode;
mod engine;
mod error;
mod options;
mod orchestrator;
mod params;
mod prompt;
pub mod stub;

pub use crate::candle::{Architecture, CandleEngine, SamplingPlan};
pub use config::LanguageModelConfig;
pub use decode::StreamDecoder;
pub use engine::{GeneratorParams, LanguageModel, TokenGenerator, TokenSequence};
pub use error::GenerationError;
pub use options::{OptionValue, SearchOptions};
pub use orchestrator::{ChunkStream, Completion, GeneratedChunk, GenerationState, ModelHandle};
pub use params::{ChatParameters, GenerationParameters, MapOptions, DEFAULT_TEMPERATURE};
pub use prompt::{ChatMessage, PromptBuilder};
