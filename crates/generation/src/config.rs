use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the generative model lives and how it is driven.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageModelConfig {
    /// Quantised GGUF weights.
    #[serde(default)]
    pub model_path: PathBuf,

    /// `tokenizer.json`; defaults to the file next to the model.
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,

    /// Total sequence length used when a request sets no `max_length`.
    #[serde(default = "default_context_length")]
    pub context_length: usize,

    /// Tokens whose appearance ends generation.
    #[serde(default = "default_end_of_text_markers")]
    pub end_of_text_markers: Vec<String>,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Window considered by `repetition_penalty`.
    #[serde(default = "default_repeat_last_n")]
    pub repeat_last_n: usize,
}

fn default_context_length() -> usize {
    2048
}

fn default_end_of_text_markers() -> Vec<String> {
    ["<|end|>", "<|endoftext|>", "</s>", "<|eot_id|>"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_seed() -> u64 {
    299_792_458
}

fn default_repeat_last_n() -> usize {
    64
}

impl Default for LanguageModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            tokenizer_path: None,
            context_length: default_context_length(),
            end_of_text_markers: default_end_of_text_markers(),
            seed: default_seed(),
            repeat_last_n: default_repeat_last_n(),
        }
    }
}

impl LanguageModelConfig {
    pub fn resolved_tokenizer_path(&self) -> PathBuf {
        match &self.tokenizer_path {
            Some(path) => path.clone(),
            None => self
                .model_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("tokenizer.json"),
        }
    }

    /// Model name reported to clients: the weights file stem.
    pub fn model_name(&self) -> String {
        self.model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
