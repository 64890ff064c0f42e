//! Completion endpoint options and `--llm-<key>` overrides.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Every option the completion endpoint client understands.
///
/// Keys that are not listed here land in `extra` and are forwarded verbatim
/// into the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// API key. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Let the model request several tool calls in one round.
    #[serde(default = "default_true")]
    pub parallel_tool_calls: bool,

    /// Extension options passed through to the endpoint untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout(),
            temperature: None,
            top_p: None,
            max_tokens: None,
            seed: None,
            parallel_tool_calls: true,
            extra: BTreeMap::new(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// Request body fields owned by the completion protocol itself.
pub const RESERVED_KEYS: &[&str] = &[
    "messages",
    "tools",
    "tool_choice",
    "stream",
    "stream_options",
    "functions",
    "function_call",
];

/// Request body fields filled from the typed options above.
const TYPED_REQUEST_KEYS: &[&str] = &[
    "model",
    "parallel_tool_calls",
    "temperature",
    "top_p",
    "max_tokens",
    "seed",
];

/// A typed `--llm-<key>` value.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl LlmValue {
    /// `true`/`false` become booleans, numeric strings become numbers,
    /// anything else stays a string.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return LlmValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return LlmValue::Bool(false);
        }
        if let Ok(int) = trimmed.parse::<i64>() {
            return LlmValue::Int(int);
        }
        match trimmed.parse::<f64>() {
            Ok(float) if float.is_finite() => LlmValue::Float(float),
            _ => LlmValue::Text(raw.to_string()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            LlmValue::Bool(_) => "boolean",
            LlmValue::Int(_) => "integer",
            LlmValue::Float(_) => "float",
            LlmValue::Text(_) => "string",
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            LlmValue::Bool(b) => Value::Bool(b),
            LlmValue::Int(i) => Value::from(i),
            LlmValue::Float(f) => Value::from(f),
            LlmValue::Text(s) => Value::String(s),
        }
    }
}

impl fmt::Display for LlmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmValue::Bool(b) => write!(f, "{}", b),
            LlmValue::Int(i) => write!(f, "{}", i),
            LlmValue::Float(x) => write!(f, "{}", x),
            LlmValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A rejected `--llm-<key>` option.
#[derive(Debug, Error, PartialEq)]
pub enum OverrideError {
    #[error("--llm-{key} expects {expected}, got {kind} '{value}'")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        kind: &'static str,
        value: String,
    },

    #[error("--llm-{0} is missing a value")]
    MissingValue(String),

    #[error("--llm- option has an empty key")]
    EmptyKey,

    #[error("--llm-{0} cannot be overridden: it is part of the completion protocol")]
    Reserved(String),
}

/// `max-tokens` -> `max_tokens`.
pub fn normalize_key(key: &str) -> String {
    key.trim().replace('-', "_").to_ascii_lowercase()
}

impl CompletionOptions {
    /// Merge one typed override. Known keys are type-checked; unknown keys
    /// go to `extra`.
    pub fn apply_override(&mut self, key: &str, value: LlmValue) -> Result<(), OverrideError> {
        let key = normalize_key(key);
        let mismatch = |expected: &'static str, value: &LlmValue| OverrideError::TypeMismatch {
            key: key.clone(),
            expected,
            kind: value.kind(),
            value: value.to_string(),
        };

        match key.as_str() {
            "" => return Err(OverrideError::EmptyKey),
            reserved if RESERVED_KEYS.contains(&reserved) => {
                return Err(OverrideError::Reserved(key.clone()))
            }
            "model" => self.model = value.to_string(),
            "base_url" | "api_base" => self.base_url = value.to_string(),
            "api_key" => self.api_key = Some(value.to_string()),
            "api_key_env" => self.api_key_env = value.to_string(),
            "timeout_seconds" | "timeout" => match &value {
                LlmValue::Int(i) if *i > 0 => self.timeout_seconds = *i as u64,
                other => return Err(mismatch("a positive integer", other)),
            },
            "temperature" => {
                let temperature = as_float(&value).ok_or_else(|| mismatch("a number", &value))?;
                self.temperature = Some(temperature);
            }
            "top_p" => {
                let top_p = as_float(&value).ok_or_else(|| mismatch("a number", &value))?;
                self.top_p = Some(top_p);
            }
            "max_tokens" => match &value {
                LlmValue::Int(i) => {
                    let tokens = u32::try_from(*i)
                        .map_err(|_| mismatch("a non-negative integer", &value))?;
                    self.max_tokens = Some(tokens);
                }
                other => return Err(mismatch("an integer", other)),
            },
            "seed" => match &value {
                LlmValue::Int(i) => self.seed = Some(*i),
                other => return Err(mismatch("an integer", other)),
            },
            "parallel_tool_calls" => match &value {
                LlmValue::Bool(b) => self.parallel_tool_calls = *b,
                other => return Err(mismatch("a boolean", other)),
            },
            _ => {
                self.extra.insert(key.clone(), value.into_json());
            }
        }

        Ok(())
    }

    /// Drop `extra` entries that would collide with a request body field.
    /// Returns the removed keys.
    pub fn sanitize_extra(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        self.extra.retain(|key, _| {
            let collides = RESERVED_KEYS.contains(&key.as_str())
                || TYPED_REQUEST_KEYS.contains(&key.as_str());
            if collides {
                removed.push(key.clone());
            }
            !collides
        });
        removed
    }

    /// Apply overrides in order; later keys win.
    pub fn apply_overrides<'a, I>(&mut self, overrides: I) -> Result<(), OverrideError>
    where
        I: IntoIterator<Item = &'a (String, LlmValue)>,
    {
        for (key, value) in overrides {
            self.apply_override(key, value.clone())?;
        }
        Ok(())
    }
}

fn as_float(value: &LlmValue) -> Option<f64> {
    match value {
        LlmValue::Float(f) => Some(*f),
        LlmValue::Int(i) => Some(*i as f64),
        _ => None,
    }
}
