//! Anthropic adapter configuration

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::core::providers::capabilities::{
    Capability, CapabilityStrength, parse_capability_overrides,
};
use crate::core::providers::error::ProviderError;
use crate::core::recovery::types::{CircuitBreakerConfig, RetryPolicy};
use crate::core::validation::validate_provider_options;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub api_version: String,
    pub model_name: String,
    /// Applied when a request carries no max_tokens; the messages API
    /// requires one.
    pub max_tokens: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
    pub capability_overrides: HashMap<Capability, CapabilityStrength>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            max_tokens: 2000,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
            capability_overrides: HashMap::new(),
        }
    }
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Read the configuration from the environment; `ANTHROPIC_API_KEY`
    /// is required.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| {
            ProviderError::authentication(
                "anthropic",
                "ANTHROPIC_API_KEY environment variable is not set",
            )
        })?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = env::var("ANTHROPIC_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Apply a validated provider-options map.
    pub fn with_options(mut self, options: Map<String, Value>) -> Result<Self, ProviderError> {
        validate_provider_options("anthropic", &options)
            .map_err(|report| ProviderError::validation_for("anthropic", report))?;

        if let Some(max_tokens) = options.get("max_tokens").and_then(Value::as_u64) {
            self.max_tokens = max_tokens as u32;
        }
        if let Some(capabilities) = options.get("capabilities") {
            self.capability_overrides = parse_capability_overrides(capabilities);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = AnthropicConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model_name, DEFAULT_MODEL);
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_options_applied() {
        let mut options = Map::new();
        options.insert("max_tokens".to_string(), json!(512));
        options.insert("capabilities".to_string(), json!({"vision": 4}));

        let config = AnthropicConfig::new("key").with_options(options).unwrap();
        assert_eq!(config.max_tokens, 512);
        assert_eq!(
            config.capability_overrides.get(&Capability::Vision),
            Some(&CapabilityStrength::Exceptional)
        );
    }

    #[test]
    fn test_unknown_option_rejected() {
        let mut options = Map::new();
        options.insert("functions".to_string(), json!([]));
        assert!(AnthropicConfig::new("key").with_options(options).is_err());
    }
}
