//! Ollama adapter configuration

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::core::providers::capabilities::{
    Capability, CapabilityStrength, parse_capability_overrides,
};
use crate::core::providers::error::ProviderError;
use crate::core::recovery::types::{CircuitBreakerConfig, RetryPolicy};
use crate::core::validation::{ValidationReport, validate_provider_options};

pub const DEFAULT_API_ENDPOINT: &str = "http://localhost:11434/api";
pub const DEFAULT_MODEL: &str = "llama3";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Local servers answer fast or not at all, so the retry window is tight.
fn default_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        min_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(5),
        backoff_factor: 2.0,
        jitter: 0.25,
        ..RetryPolicy::default()
    }
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model_name: String,
    /// Endpoint including the `/api` prefix.
    pub api_endpoint: String,
    pub max_tokens: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
    /// Extra generation options forwarded under the wire `options` object
    /// (repeat_penalty, mirostat).
    pub extra_options: Map<String, Value>,
    pub capability_overrides: HashMap<Capability, CapabilityStrength>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            max_tokens: 2000,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: default_retry(),
            breaker: CircuitBreakerConfig::default(),
            extra_options: Map::new(),
            capability_overrides: HashMap::new(),
        }
    }
}

impl OllamaConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model_name: model.into(),
            ..Self::default()
        }
    }

    /// Read endpoint and timeouts from the environment
    /// (`OLLAMA_API_ENDPOINT`, `OLLAMA_CONNECT_TIMEOUT`,
    /// `OLLAMA_REQUEST_TIMEOUT`); everything is optional.
    pub fn from_env() -> Result<Self, ProviderError> {
        let mut config = Self::default();
        if let Ok(endpoint) = env::var("OLLAMA_API_ENDPOINT") {
            config = config.with_endpoint(endpoint)?;
        }
        if let Some(connect) = read_env_seconds("OLLAMA_CONNECT_TIMEOUT")? {
            config.connect_timeout = connect;
        }
        if let Some(request) = read_env_seconds("OLLAMA_REQUEST_TIMEOUT")? {
            config.request_timeout = request;
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = model.into();
        self
    }

    /// Set and validate the API endpoint; must be http(s) and loses any
    /// trailing slash.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Result<Self, ProviderError> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ProviderError::validation_for(
                "ollama",
                ValidationReport::with_issue("api_endpoint", "must start with http:// or https://"),
            ));
        }
        self.api_endpoint = endpoint.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Apply a validated provider-options map; `functions` is rejected,
    /// generation extras are kept for the wire `options` object.
    pub fn with_options(mut self, options: Map<String, Value>) -> Result<Self, ProviderError> {
        validate_provider_options("ollama", &options)
            .map_err(|report| ProviderError::validation_for("ollama", report))?;

        if let Some(endpoint) = options.get("api_endpoint").and_then(Value::as_str) {
            self = self.with_endpoint(endpoint)?;
        }
        if let Some(connect) = options.get("connect_timeout").and_then(Value::as_f64) {
            self.connect_timeout = Duration::from_secs_f64(connect);
        }
        if let Some(request) = options.get("request_timeout").and_then(Value::as_f64) {
            self.request_timeout = Duration::from_secs_f64(request);
        }
        if let Some(max_tokens) = options.get("max_tokens").and_then(Value::as_u64) {
            self.max_tokens = max_tokens as u32;
        }
        if let Some(capabilities) = options.get("capabilities") {
            self.capability_overrides = parse_capability_overrides(capabilities);
        }
        for key in ["repeat_penalty", "mirostat"] {
            if let Some(value) = options.get(key) {
                self.extra_options.insert(key.to_string(), value.clone());
            }
        }
        Ok(self)
    }
}

fn read_env_seconds(name: &str) -> Result<Option<Duration>, ProviderError> {
    match env::var(name) {
        Ok(raw) => {
            let seconds: f64 = raw.parse().map_err(|_| {
                ProviderError::validation_for(
                    "ollama",
                    ValidationReport::with_issue(name, format!("not a number of seconds: {raw}")),
                )
            })?;
            Ok(Some(Duration::from_secs_f64(seconds)))
        }
        Err(_) => Ok(None),
    }
}
