//! Named search options handed to the engine.
//!
//! The table is keyed by the engine's canonical option name. Setting a key
//! twice replaces the earlier value, so applying the same request twice
//! yields the same table.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::GenerationError;

/// One configured option value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Strings(Vec<String>),
}

impl OptionValue {
    pub fn kind(&self) -> &'static str {
        match self {
            OptionValue::Int(_) => "integer",
            OptionValue::Float(_) => "number",
            OptionValue::Bool(_) => "boolean",
            OptionValue::Strings(_) => "string array",
        }
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(i64::from(value))
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        OptionValue::Int(i64::from(value))
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<f32> for OptionValue {
    fn from(value: f32) -> Self {
        OptionValue::Float(f64::from(value))
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        OptionValue::Strings(value)
    }
}

/// Engine option table built per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchOptions {
    values: BTreeMap<String, OptionValue>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<OptionValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Numeric read that accepts integers for float-typed options.
    pub fn float(&self, key: &str) -> Result<Option<f64>, GenerationError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::Float(v)) => Ok(Some(*v)),
            Some(OptionValue::Int(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(kind_mismatch(key, "number", other)),
        }
    }

    pub fn int(&self, key: &str) -> Result<Option<i64>, GenerationError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(kind_mismatch(key, "integer", other)),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>, GenerationError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::Bool(v)) => Ok(Some(*v)),
            Some(other) => Err(kind_mismatch(key, "boolean", other)),
        }
    }

    pub fn strings(&self, key: &str) -> Result<Option<&[String]>, GenerationError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::Strings(v)) => Ok(Some(v.as_slice())),
            Some(other) => Err(kind_mismatch(key, "string array", other)),
        }
    }
}

fn kind_mismatch(key: &str, expected: &str, found: &OptionValue) -> GenerationError {
    GenerationError::invalid_option(key, format!("expected {expected}, got {}", found.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_previous_value() {
        let mut opts = SearchOptions::new();
        opts.set("temperature", 0.7_f64);
        opts.set("temperature", 0.2_f64);
        assert_eq!(opts.len(), 1);
        assert_eq!(opts.get("temperature"), Some(&OptionValue::Float(0.2)));
    }

    #[test]
    fn float_accepts_integers() {
        let mut opts = SearchOptions::new();
        opts.set("max_time", 3_i64);
        assert_eq!(opts.float("max_time").unwrap(), Some(3.0));
    }

    #[test]
    fn int_rejects_float() {
        let mut opts = SearchOptions::new();
        opts.set("top_k", 4.5_f64);
        let err = opts.int("top_k").unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOption { .. }));
    }

    #[test]
    fn absent_key_reads_none() {
        let opts = SearchOptions::new();
        assert_eq!(opts.bool("do_sample").unwrap(), None);
        assert!(opts.strings("stop").unwrap().is_none());
    }

    #[test]
    fn strings_round_trip() {
        let mut opts = SearchOptions::new();
        opts.set("stop", vec!["</s>".to_string()]);
        assert_eq!(opts.strings("stop").unwrap(), Some(&["</s>".to_string()][..]));
    }
}
