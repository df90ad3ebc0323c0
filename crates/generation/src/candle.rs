//! Quantised GGUF engine on candle.
//!
//! Weights are loaded once; every generator works on a clone of them (tensor
//! storage is shared, only the per-layer KV cache is private) so a finished
//! or failed generation leaves nothing behind.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::{quantized_llama, quantized_phi3};
use candle_transformers::utils::apply_repeat_penalty;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::config::LanguageModelConfig;
use crate::engine::{GeneratorParams, LanguageModel, TokenGenerator};
use crate::options::SearchOptions;
use crate::GenerationError;

/// Options the engine understands but has no use for.
const INERT_BOOL: &[&str] = &[
    "details",
    "decoder_input_details",
    "watermark",
    "logprobs",
];
const INERT_INT: &[&str] = &["best_of", "n", "top_logprobs", "top_n_tokens", "truncate"];
const INERT_FLOAT: &[&str] = &["typical_p"];

const ACTIVE: &[&str] = &[
    "temperature",
    "top_k",
    "top_p",
    "do_sample",
    "seed",
    "repetition_penalty",
    "frequency_penalty",
    "presence_penalty",
    "max_length",
    "max_time",
    "stop",
    "return_full_text",
];

/// Decoding settings resolved from a search-option table.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPlan {
    /// `None` means greedy decoding.
    pub temperature: Option<f64>,
    pub top_k: Option<usize>,
    pub top_p: Option<f64>,
    pub seed: u64,
    pub repetition_penalty: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_length: usize,
    pub max_time: Option<Duration>,
    pub stop: Vec<String>,
}

impl SamplingPlan {
    pub fn from_options(
        options: &SearchOptions,
        config: &LanguageModelConfig,
    ) -> Result<Self, GenerationError> {
        for (key, _) in options.iter() {
            let known = ACTIVE.contains(&key)
                || INERT_BOOL.contains(&key)
                || INERT_INT.contains(&key)
                || INERT_FLOAT.contains(&key);
            if !known {
                return Err(GenerationError::invalid_option(key, "unknown option"));
            }
        }
        for key in INERT_BOOL {
            if let Some(v) = options.bool(key)? {
                debug!(option = key, value = v, "option accepted without effect");
            }
        }
        for key in INERT_INT {
            if let Some(v) = options.int(key)? {
                debug!(option = key, value = v, "option accepted without effect");
            }
        }
        for key in INERT_FLOAT {
            if let Some(v) = options.float(key)? {
                debug!(option = key, value = v, "option accepted without effect");
            }
        }

        let temperature = match options.float("temperature")? {
            Some(t) if t.is_nan() || t < 0.0 => {
                return Err(GenerationError::invalid_option(
                    "temperature",
                    "must be zero or positive",
                ))
            }
            other => other,
        };
        let do_sample = options.bool("do_sample")?.unwrap_or(true);
        let temperature = match temperature {
            _ if !do_sample => None,
            Some(t) if t <= 0.0 => None,
            Some(t) => Some(t),
            None => Some(1.0),
        };

        let top_k = match options.int("top_k")? {
            Some(k) if k <= 0 => {
                return Err(GenerationError::invalid_option("top_k", "must be positive"))
            }
            Some(k) => Some(k as usize),
            None => None,
        };
        let top_p = match options.float("top_p")? {
            Some(p) if !(p > 0.0 && p <= 1.0) => {
                return Err(GenerationError::invalid_option("top_p", "must be in (0, 1]"))
            }
            other => other,
        };
        let repetition_penalty = match options.float("repetition_penalty")? {
            Some(p) if !(p > 0.0) => {
                return Err(GenerationError::invalid_option(
                    "repetition_penalty",
                    "must be positive",
                ))
            }
            Some(p) => p as f32,
            None => 1.0,
        };
        let frequency_penalty = finite(options, "frequency_penalty")?.unwrap_or(0.0) as f32;
        let presence_penalty = finite(options, "presence_penalty")?.unwrap_or(0.0) as f32;
        let max_length = match options.int("max_length")? {
            Some(n) if n <= 0 => {
                return Err(GenerationError::invalid_option(
                    "max_length",
                    "must be positive",
                ))
            }
            Some(n) => n as usize,
            None => config.context_length,
        };
        let max_time = match options.float("max_time")? {
            Some(s) if !(s > 0.0) || !s.is_finite() => {
                return Err(GenerationError::invalid_option(
                    "max_time",
                    "must be a positive number of seconds",
                ))
            }
            Some(s) => Some(
                Duration::try_from_secs_f64(s)
                    .map_err(|e| GenerationError::invalid_option("max_time", e.to_string()))?,
            ),
            None => None,
        };
        // Read by the orchestrator when decoding; only its kind matters here.
        options.bool("return_full_text")?;
        let seed = options
            .int("seed")?
            .map(|s| s as u64)
            .unwrap_or(config.seed);
        let stop = options.strings("stop")?.map(<[String]>::to_vec).unwrap_or_default();

        Ok(Self {
            temperature,
            top_k,
            top_p,
            seed,
            repetition_penalty,
            frequency_penalty,
            presence_penalty,
            max_length,
            max_time,
            stop,
        })
    }

    pub fn sampling(&self) -> Sampling {
        let Some(temperature) = self.temperature else {
            return Sampling::ArgMax;
        };
        match (self.top_k, self.top_p) {
            (None, None) => Sampling::All { temperature },
            (Some(k), None) => Sampling::TopK { k, temperature },
            (None, Some(p)) => Sampling::TopP { p, temperature },
            (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
        }
    }
}

fn finite(options: &SearchOptions, key: &str) -> Result<Option<f64>, GenerationError> {
    match options.float(key)? {
        Some(v) if !v.is_finite() => Err(GenerationError::invalid_option(key, "must be finite")),
        other => Ok(other),
    }
}

/// Model families the engine runs, keyed by the GGUF `general.architecture` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Llama,
    Phi3,
}

impl Architecture {
    pub fn from_name(name: &str) -> Result<Self, GenerationError> {
        match name {
            "llama" => Ok(Self::Llama),
            "phi3" => Ok(Self::Phi3),
            other => Err(GenerationError::Engine(format!(
                "unsupported model architecture `{other}`"
            ))),
        }
    }

    fn of(content: &gguf_file::Content) -> Result<Self, GenerationError> {
        let name = content
            .metadata
            .get("general.architecture")
            .ok_or_else(|| GenerationError::Engine("GGUF metadata lacks general.architecture".into()))?
            .to_string()?;
        Self::from_name(name)
    }
}

#[derive(Clone)]
enum Weights {
    Llama(quantized_llama::ModelWeights),
    Phi3(quantized_phi3::ModelWeights),
}

impl Weights {
    fn load(path: &Path, device: &Device) -> Result<(Architecture, Self), GenerationError> {
        let mut file = File::open(path)?;
        let content = gguf_file::Content::read(&mut file)?;
        let architecture = Architecture::of(&content)?;
        let weights = match architecture {
            Architecture::Llama => {
                Self::Llama(quantized_llama::ModelWeights::from_gguf(content, &mut file, device)?)
            }
            Architecture::Phi3 => Self::Phi3(quantized_phi3::ModelWeights::from_gguf(
                false, content, &mut file, device,
            )?),
        };
        Ok((architecture, weights))
    }

    fn forward(&mut self, input: &Tensor, index_pos: usize) -> candle_core::Result<Tensor> {
        match self {
            Self::Llama(model) => model.forward(input, index_pos),
            Self::Phi3(model) => model.forward(input, index_pos),
        }
    }
}

/// Loaded GGUF weights plus tokenizer.
pub struct CandleEngine {
    weights: Weights,
    tokenizer: Arc<Tokenizer>,
    device: Device,
    end_of_text: Vec<u32>,
    config: LanguageModelConfig,
}

impl CandleEngine {
    pub fn load(config: LanguageModelConfig) -> Result<Self, GenerationError> {
        let tokenizer_path = config.resolved_tokenizer_path();
        if !config.model_path.exists() {
            return Err(GenerationError::ModelNotFound(
                config.model_path.display().to_string(),
            ));
        }
        if !tokenizer_path.exists() {
            return Err(GenerationError::ModelNotFound(
                tokenizer_path.display().to_string(),
            ));
        }

        let started = Instant::now();
        let device = Device::Cpu;
        let (architecture, weights) = Weights::load(&config.model_path, &device)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;

        let end_of_text: Vec<u32> = config
            .end_of_text_markers
            .iter()
            .filter_map(|marker| tokenizer.token_to_id(marker))
            .collect();

        info!(
            model = %config.model_path.display(),
            architecture = ?architecture,
            tokenizer = %tokenizer_path.display(),
            end_of_text = ?end_of_text,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "language model loaded"
        );

        Ok(Self {
            weights,
            tokenizer: Arc::new(tokenizer),
            device,
            end_of_text,
            config,
        })
    }

    pub fn config(&self) -> &LanguageModelConfig {
        &self.config
    }
}

impl LanguageModel for CandleEngine {
    fn encode(&self, text: &str) -> Result<Vec<u32>, GenerationError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, GenerationError> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))
    }

    fn generator(
        &self,
        params: GeneratorParams,
    ) -> Result<Box<dyn TokenGenerator>, GenerationError> {
        let plan = SamplingPlan::from_options(&params.options, &self.config)?;
        debug!(
            prompt_tokens = params.input.len(),
            max_length = plan.max_length,
            seed = plan.seed,
            greedy = plan.temperature.is_none(),
            "generator configured"
        );

        let processor = LogitsProcessor::from_sampling(plan.seed, plan.sampling());
        Ok(Box::new(CandleGenerator {
            model: self.weights.clone(),
            device: self.device.clone(),
            tokenizer: Arc::clone(&self.tokenizer),
            end_of_text: self.end_of_text.clone(),
            repeat_last_n: self.config.repeat_last_n,
            tokens: params.input.ids().to_vec(),
            prompt_len: params.input.len(),
            index_pos: 0,
            logits: None,
            processor,
            plan,
            started: Instant::now(),
            finished: false,
        }))
    }
}

struct CandleGenerator {
    model: Weights,
    device: Device,
    tokenizer: Arc<Tokenizer>,
    end_of_text: Vec<u32>,
    repeat_last_n: usize,
    tokens: Vec<u32>,
    prompt_len: usize,
    index_pos: usize,
    logits: Option<Tensor>,
    processor: LogitsProcessor,
    plan: SamplingPlan,
    started: Instant,
    finished: bool,
}

impl CandleGenerator {
    fn apply_penalties(&self, logits: Tensor) -> Result<Tensor, GenerationError> {
        let mut logits = logits;
        if self.plan.repetition_penalty != 1.0 {
            let start = self.tokens.len().saturating_sub(self.repeat_last_n);
            logits = apply_repeat_penalty(&logits, self.plan.repetition_penalty, &self.tokens[start..])?;
        }

        let (frequency, presence) = (self.plan.frequency_penalty, self.plan.presence_penalty);
        if frequency == 0.0 && presence == 0.0 {
            return Ok(logits);
        }
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for &token in &self.tokens[self.prompt_len..] {
            *counts.entry(token).or_default() += 1;
        }
        if counts.is_empty() {
            return Ok(logits);
        }
        let mut values = logits.to_vec1::<f32>()?;
        for (token, count) in counts {
            if let Some(v) = values.get_mut(token as usize) {
                *v -= frequency * count as f32 + presence;
            }
        }
        let len = values.len();
        Ok(Tensor::from_vec(values, len, &self.device)?)
    }

    fn hit_stop_string(&self) -> Result<bool, GenerationError> {
        if self.plan.stop.is_empty() {
            return Ok(false);
        }
        let text = self
            .tokenizer
            .decode(&self.tokens[self.prompt_len..], true)
            .map_err(|e| GenerationError::Tokenizer(e.to_string()))?;
        Ok(self.plan.stop.iter().any(|s| !s.is_empty() && text.contains(s.as_str())))
    }
}

impl TokenGenerator for CandleGenerator {
    fn is_done(&self) -> bool {
        self.finished
            || self.tokens.len() >= self.plan.max_length
            || self
                .plan
                .max_time
                .is_some_and(|limit| self.started.elapsed() >= limit)
    }

    fn compute_logits(&mut self) -> Result<(), GenerationError> {
        let context = if self.index_pos == 0 { self.tokens.len() } else { 1 };
        let start = self.tokens.len().saturating_sub(context);
        let input = Tensor::new(&self.tokens[start..], &self.device)?.unsqueeze(0)?;
        let logits = self
            .model
            .forward(&input, self.index_pos)?
            .squeeze(0)?
            .to_dtype(DType::F32)?;
        self.index_pos += context;
        self.logits = Some(self.apply_penalties(logits)?);
        Ok(())
    }

    fn generate_next_token(&mut self) -> Result<u32, GenerationError> {
        let logits = self.logits.take().ok_or_else(|| {
            GenerationError::Engine("generate_next_token called before compute_logits".into())
        })?;
        let next = self.processor.sample(&logits)?;
        self.tokens.push(next);
        if self.end_of_text.contains(&next) || self.hit_stop_string()? {
            self.finished = true;
        }
        Ok(next)
    }

    fn sequence(&self) -> &[u32] {
        &self.tokens
    }
}
