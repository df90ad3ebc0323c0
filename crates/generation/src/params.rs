//! Request parameters and their projection onto engine search options.
//!
//! Every field is independently optional. A present value is forwarded
//! verbatim under its canonical option key; an absent one follows the
//! field's own default policy, which for everything except `temperature`
//! means leaving the option unset so the engine default applies. Nothing
//! here validates ranges or types: the engine rejects what it cannot use.

use serde::{Deserialize, Serialize};

use crate::options::{OptionValue, SearchOptions};

/// Temperature applied when a request leaves it unset.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Anything that can be projected onto the engine's option table.
pub trait MapOptions {
    fn apply_to(&self, options: &mut SearchOptions);

    fn to_search_options(&self) -> SearchOptions {
        let mut options = SearchOptions::new();
        self.apply_to(&mut options);
        options
    }
}

/// Forward `value` under `key`, or `default` when absent and one is declared.
fn apply<T>(options: &mut SearchOptions, key: &str, value: Option<T>, default: Option<T>)
where
    T: Into<OptionValue>,
{
    if let Some(v) = value.or(default) {
        options.set(key, v);
    }
}

/// Text-generation parameters, named as the hosted text-generation API names them.
///
/// `Default` is the all-absent set. Deserializing an object that omits
/// `temperature` yields `Some(1.0)`, the client-side default of that API;
/// an explicit `null` deserializes to absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(
        default = "client_default_temperature",
        skip_serializing_if = "Option::is_none"
    )]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_full_text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_sample: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typical_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_of: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder_input_details: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncate: Option<i64>,
}

fn client_default_temperature() -> Option<f64> {
    Some(1.0)
}

impl MapOptions for GenerationParameters {
    fn apply_to(&self, options: &mut SearchOptions) {
        apply(options, "top_k", self.top_k, None);
        apply(options, "top_p", self.top_p, None);
        apply(options, "temperature", self.temperature, Some(DEFAULT_TEMPERATURE));
        apply(options, "repetition_penalty", self.repetition_penalty, None);
        // max_length bounds every engine; max_new_tokens is not universally understood
        apply(options, "max_length", self.max_new_tokens, None);
        apply(options, "max_time", self.max_time, None);
        apply(options, "return_full_text", self.return_full_text, None);
        apply(options, "do_sample", self.do_sample, None);
        apply(options, "details", self.details, None);
        apply(options, "stop", self.stop.clone(), None);
        apply(options, "typical_p", self.typical_p, None);
        apply(options, "best_of", self.best_of, None);
        apply(options, "decoder_input_details", self.decoder_input_details, None);
        apply(options, "watermark", self.watermark, None);
        apply(options, "frequency_penalty", self.frequency_penalty, None);
        apply(options, "seed", self.seed, None);
        apply(options, "top_n_tokens", self.top_n_tokens, None);
        apply(options, "truncate", self.truncate, None);
    }
}

/// Sampling fields of a chat-completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl MapOptions for ChatParameters {
    fn apply_to(&self, options: &mut SearchOptions) {
        apply(options, "temperature", self.temperature, Some(DEFAULT_TEMPERATURE as f32));
        apply(options, "top_p", self.top_p, None);
        apply(options, "max_length", self.max_tokens, None);
        apply(options, "n", self.n, None);
        apply(options, "frequency_penalty", self.frequency_penalty, None);
        apply(options, "presence_penalty", self.presence_penalty, None);
        apply(options, "logprobs", self.logprobs, None);
        apply(options, "seed", self.seed, None);
        apply(options, "top_logprobs", self.top_logprobs, None);
        apply(options, "stop", self.stop.clone(), None);
    }
}
