//! Forwarder configuration, from explicit values, JSON, or the environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RelayError;

/// Base URL used when none is configured.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Local vLLM server exposing the OpenAI-compatible API.
pub const LOCAL_VLLM_BASE_URL: &str = "http://localhost:8000/v1";

/// Model served by the local vLLM preset.
pub const LOCAL_VLLM_MODEL: &str = "tiiuae/falcon-7b";

/// Placeholder key accepted by vLLM servers started without authentication.
pub const LOCAL_VLLM_API_KEY: &str = "EMPTY";

/// Static settings of a [`ModelForwarder`](crate::llm::ModelForwarder).
///
/// Captured once at construction and not revalidated per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Model identifier sent with every request
    pub model_name: String,
    /// API base URL; a trailing `/chat/completions` is tolerated
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token for the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Instructions sent ahead of every task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Optional request timeout in milliseconds; none by default, and `0`
    /// disables it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_base_url() -> String {
    OPENROUTER_BASE_URL.to_string()
}

impl ForwarderConfig {
    /// Creates a config for `model_name` against the default base URL.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            base_url: default_base_url(),
            api_key: None,
            system_prompt: None,
            timeout_ms: None,
        }
    }

    /// A local vLLM server with no authentication.
    pub fn local_vllm() -> Self {
        Self::new(LOCAL_VLLM_MODEL)
            .with_base_url(LOCAL_VLLM_BASE_URL)
            .with_api_key(LOCAL_VLLM_API_KEY)
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Sets the request timeout, rounding sub-millisecond values up to 1 ms.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let mut millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 && !timeout.is_zero() {
            millis = 1;
        }
        self.timeout_ms = Some(millis);
        self
    }

    /// Returns the request timeout, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }

    /// Parses a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads the config from the process environment.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `LLM_MODEL` (required) | `model_name` |
    /// | `LLM_BASE_URL` | `base_url` |
    /// | `LLM_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY` | `api_key` |
    /// | `LLM_SYSTEM_PROMPT` | `system_prompt` |
    /// | `LLM_TIMEOUT_MS`, then `LLM_TIMEOUT_SECS` | `timeout_ms` |
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the config through `lookup`, using the same variables as
    /// [`from_env`](Self::from_env). Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let model_name = get("LLM_MODEL")
            .ok_or_else(|| RelayError::Config("LLM_MODEL is not set".to_string()))?;

        let parse = |key: &str, raw: String| {
            raw.trim().parse::<u64>().map_err(|e| {
                RelayError::Config(format!("{} must be a whole number: {}", key, e))
            })
        };
        let timeout_ms = match (get("LLM_TIMEOUT_MS"), get("LLM_TIMEOUT_SECS")) {
            (Some(raw), _) => Some(parse("LLM_TIMEOUT_MS", raw)?),
            (None, Some(raw)) => Some(parse("LLM_TIMEOUT_SECS", raw)?.saturating_mul(1000)),
            (None, None) => None,
        };

        Ok(Self {
            model_name,
            base_url: get("LLM_BASE_URL").unwrap_or_else(default_base_url),
            api_key: get("LLM_API_KEY")
                .or_else(|| get("OPENROUTER_API_KEY"))
                .or_else(|| get("OPENAI_API_KEY")),
            system_prompt: get("LLM_SYSTEM_PROMPT"),
            timeout_ms,
        })
    }
}
