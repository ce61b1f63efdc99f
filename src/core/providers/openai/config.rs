//! OpenAI adapter configuration

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

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1";

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: Option<String>,
    pub organization: Option<String>,
    pub base_url: String,
    pub model_name: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
    pub capability_overrides: HashMap<Capability, CapabilityStrength>,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            organization: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
            capability_overrides: HashMap::new(),
        }
    }
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Read the configuration from the environment; `OPENAI_API_KEY` is
    /// required, `OPENAI_ORGANIZATION` optional.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            ProviderError::authentication(
                "openai",
                "OPENAI_API_KEY environment variable is not set",
            )
        })?;
        let mut config = Self::new(api_key);
        config.organization = env::var("OPENAI_ORGANIZATION").ok();
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
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

    /// Apply a validated provider-options map; `functions` and `tools`
    /// are mutually exclusive here.
    pub fn with_options(mut self, options: Map<String, Value>) -> Result<Self, ProviderError> {
        validate_provider_options("openai", &options)
            .map_err(|report| ProviderError::validation_for("openai", report))?;

        if let Some(organization) = options.get("organization").and_then(Value::as_str) {
            self.organization = Some(organization.to_string());
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
        let config = OpenAIConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model_name, DEFAULT_MODEL);
    }

    #[test]
    fn test_functions_and_tools_rejected_together() {
        let mut options = Map::new();
        options.insert("functions".to_string(), json!([]));
        options.insert("tools".to_string(), json!([]));
        assert!(OpenAIConfig::new("key").with_options(options).is_err());
    }

    #[test]
    fn test_organization_option() {
        let mut options = Map::new();
        options.insert("organization".to_string(), json!("org-1"));
        let config = OpenAIConfig::new("key").with_options(options).unwrap();
        assert_eq!(config.organization.as_deref(), Some("org-1"));
    }
}
