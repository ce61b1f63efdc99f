//! Ollama adapter for local models

use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use once_cell::sync::Lazy;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use super::NAME;
use super::client::OllamaClient;
use super::config::OllamaConfig;
use super::streaming::OllamaChunkDecoder;
use crate::core::providers::capabilities::{Capability, CapabilityStrength};
use crate::core::providers::error::ProviderError;
use crate::core::providers::pricing::PriceTable;
use crate::core::providers::{KeyValidation, ModelProvider, estimate_tokens};
use crate::core::recovery::circuit_breaker::CircuitBreaker;
use crate::core::recovery::retry;
use crate::core::streaming::StreamHandler;
use crate::core::types::request::ModelRequest;
use crate::core::types::response::{CostEstimate, ModelResponse, TokenUsage};
use crate::core::validation::Validate;

/// Installed-model listings keyed by endpoint, shared by every adapter
/// instance in the process and expired after five minutes.
static MODEL_CACHE: Lazy<Cache<String, Vec<String>>> = Lazy::new(|| {
    Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(64)
        .build()
});

pub struct OllamaProvider {
    config: OllamaConfig,
    client: OllamaClient,
    breaker: CircuitBreaker,
    pricing: PriceTable,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Result<Self, ProviderError> {
        let client = OllamaClient::new(config.clone())?;
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Ok(Self {
            config,
            client,
            breaker,
            // local inference is billed at nothing
            pricing: PriceTable::free(),
        })
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(OllamaConfig::from_env()?)
    }

    fn build_payload(&self, request: &ModelRequest, stream: bool) -> Result<Value, ProviderError> {
        request
            .validate()
            .map_err(|report| ProviderError::validation_for(NAME, report))?;

        let mut payload = request.to_provider_request(NAME);
        payload["model"] = json!(self.request_model(request));
        payload["stream"] = json!(stream);

        let options = payload["options"]
            .as_object_mut()
            .expect("ollama shape always carries options");
        if !options.contains_key("num_predict") {
            options.insert("num_predict".to_string(), json!(self.config.max_tokens));
        }
        for (key, value) in &self.config.extra_options {
            options.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Ok(payload)
    }

    fn request_model(&self, request: &ModelRequest) -> String {
        request
            .model
            .clone()
            .unwrap_or_else(|| self.config.model_name.clone())
    }

    fn parse_response(&self, request: &ModelRequest, raw: Value) -> ModelResponse {
        let content = raw
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let model = self.request_model(request);

        let usage = self.calculate_token_usage(request, &raw);
        let cost = self.calculate_cost(&usage, &model);
        let finish_reason = if raw.get("done").and_then(Value::as_bool).unwrap_or(true) {
            "stop"
        } else {
            "unknown"
        };

        ModelResponse::new(NAME, model, content, usage, cost)
            .with_finish_reason(finish_reason)
            .with_raw_response(raw)
    }

    async fn fetch_models(&self) -> Vec<String> {
        match self.client.tags().await {
            Ok(listing) => {
                let models: Vec<String> = listing
                    .get("models")
                    .and_then(Value::as_array)
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|entry| entry.get("name").and_then(Value::as_str))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                if models.is_empty() {
                    warn!(endpoint = %self.config.api_endpoint, "ollama server returned no models");
                } else {
                    info!(
                        endpoint = %self.config.api_endpoint,
                        count = models.len(),
                        "discovered ollama models"
                    );
                }
                models
            }
            Err(error) => {
                warn!(endpoint = %self.config.api_endpoint, %error, "failed to fetch ollama models");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    /// Installed models from `/tags`, cached per endpoint for five minutes.
    async fn get_available_models(&self) -> Result<Vec<String>, ProviderError> {
        let key = self.config.api_endpoint.clone();
        if let Some(models) = MODEL_CACHE.get(&key) {
            return Ok(models);
        }
        let models = self.fetch_models().await;
        MODEL_CACHE.insert(key, models.clone());
        Ok(models)
    }

    /// Server liveness via `/version`; Ollama has no API key.
    async fn validate_api_key(&self) -> bool {
        match self.client.version().await {
            Ok(_) => true,
            Err(error) => {
                warn!(endpoint = %self.config.api_endpoint, %error, "ollama server unreachable");
                false
            }
        }
    }

    async fn validate_api_key_detailed(&self) -> KeyValidation {
        let valid = self.validate_api_key().await;
        KeyValidation {
            valid,
            provider: NAME.to_string(),
            // no key exists; reported true for interface uniformity
            key_present: true,
            error: if valid {
                None
            } else {
                Some(format!(
                    "ollama server at {} is not accessible",
                    self.config.api_endpoint
                ))
            },
        }
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        let payload = self.build_payload(request, false)?;

        if !self.breaker.allow_request() {
            return Err(ProviderError::circuit_open(NAME));
        }
        let result = retry::execute(&self.config.retry, || self.client.generate(&payload)).await;
        match result {
            Ok(raw) => {
                self.breaker.record_success();
                Ok(self.parse_response(request, raw))
            }
            Err(error) => {
                self.breaker.record_failure();
                Err(error)
            }
        }
    }

    async fn stream(
        &self,
        request: &ModelRequest,
    ) -> Result<(ModelResponse, StreamHandler), ProviderError> {
        let payload = self.build_payload(request, true)?;

        if !self.breaker.allow_request() {
            return Err(ProviderError::circuit_open(NAME));
        }
        let opened = retry::execute(&self.config.retry, || {
            self.client.open_generate_stream(&payload)
        })
        .await;
        let response = match opened {
            Ok(response) => {
                self.breaker.record_success();
                response
            }
            Err(error) => {
                self.breaker.record_failure();
                return Err(error);
            }
        };

        let model = self.request_model(request);
        let mut raw = Map::new();
        raw.insert("provider".to_string(), json!(NAME));
        raw.insert("model".to_string(), json!(model));
        raw.insert("streaming".to_string(), json!(true));
        let initial = ModelResponse::new(
            NAME,
            model.clone(),
            "",
            TokenUsage::zero(),
            CostEstimate::zero(),
        )
        .with_raw_response(Value::Object(raw));

        let handler = StreamHandler::from_byte_stream(
            NAME,
            model,
            initial.clone(),
            self.pricing.clone(),
            response.bytes_stream(),
            Box::new(OllamaChunkDecoder),
        );
        handler.start();
        Ok((initial, handler))
    }

    /// Counts from `prompt_eval_count` / `eval_count`, falling back to
    /// the character estimate when the server reports none.
    fn calculate_token_usage(&self, request: &ModelRequest, raw: &Value) -> TokenUsage {
        let mut input = raw
            .get("prompt_eval_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let mut output = raw.get("eval_count").and_then(Value::as_u64).unwrap_or(0);

        if input == 0 {
            input = estimate_tokens(&request.flattened_text());
        }
        if output == 0 {
            if let Some(generated) = raw.get("response").and_then(Value::as_str) {
                output = estimate_tokens(generated);
            }
        }
        TokenUsage::from_counts(input, output)
    }

    fn calculate_cost(&self, usage: &TokenUsage, model: &str) -> CostEstimate {
        self.pricing.cost(usage, model)
    }

    fn get_capability_strength(&self, capability: Capability) -> CapabilityStrength {
        if let Some(strength) = self.config.capability_overrides.get(&capability) {
            return *strength;
        }
        match capability {
            Capability::Local | Capability::Inexpensive => CapabilityStrength::Exceptional,
            Capability::Conversation => CapabilityStrength::Moderate,
            _ => CapabilityStrength::Basic,
        }
    }
}
