//! OpenAI adapter

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::client::OpenAIClient;
use super::config::OpenAIConfig;
use super::streaming::OpenAIChunkDecoder;
use super::{NAME, price_table};
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

/// Served when the live model listing cannot be fetched.
const FALLBACK_MODELS: &[&str] = &["gpt-4o", "gpt-4-turbo", "gpt-4", "gpt-3.5-turbo"];

pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: OpenAIClient,
    breaker: CircuitBreaker,
    pricing: PriceTable,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Result<Self, ProviderError> {
        let client = OpenAIClient::new(config.clone())?;
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Ok(Self {
            config,
            client,
            breaker,
            pricing: price_table(),
        })
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(OpenAIConfig::from_env()?)
    }

    fn build_payload(&self, request: &ModelRequest) -> Result<Value, ProviderError> {
        request
            .validate()
            .map_err(|report| ProviderError::validation_for(NAME, report))?;

        let mut payload = request.to_provider_request(NAME);
        payload["model"] = json!(self.request_model(request));
        Ok(payload)
    }

    fn request_model(&self, request: &ModelRequest) -> String {
        request
            .model
            .clone()
            .unwrap_or_else(|| self.config.model_name.clone())
    }

    fn parse_response(&self, request: &ModelRequest, raw: Value) -> Result<ModelResponse, ProviderError> {
        let content = raw
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::api(NAME, None, "response missing message content", false)
            })?
            .to_string();

        let model = raw
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.request_model(request));

        let usage = self.calculate_token_usage(request, &raw);
        let cost = self.calculate_cost(&usage, &model);

        let mut response = ModelResponse::new(NAME, model, content, usage, cost);
        if let Some(finish) = raw
            .pointer("/choices/0/finish_reason")
            .and_then(Value::as_str)
        {
            response = response.with_finish_reason(finish);
        }
        Ok(response.with_raw_response(raw))
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    /// Live listing filtered to chat models; a static catalog stands in
    /// when the backend cannot be reached.
    async fn get_available_models(&self) -> Result<Vec<String>, ProviderError> {
        match self.client.list_models().await {
            Ok(listing) => {
                let models = listing
                    .get("data")
                    .and_then(Value::as_array)
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|entry| entry.get("id").and_then(Value::as_str))
                            .filter(|id| id.to_lowercase().contains("gpt"))
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Ok(models)
            }
            Err(error) => {
                warn!(%error, "failed to list openai models, serving fallback catalog");
                Ok(FALLBACK_MODELS.iter().map(ToString::to_string).collect())
            }
        }
    }

    async fn validate_api_key(&self) -> bool {
        if self.config.api_key.is_none() {
            return false;
        }
        let probe = json!({
            "model": self.config.model_name,
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "Say A"}],
        });
        match self.client.chat_completions(&probe).await {
            Ok(_) => {
                info!("openai API key validated");
                true
            }
            Err(error) => {
                warn!(%error, "openai API key validation failed");
                false
            }
        }
    }

    async fn validate_api_key_detailed(&self) -> KeyValidation {
        let key_present = self.config.api_key.is_some();
        let valid = self.validate_api_key().await;
        KeyValidation {
            valid,
            provider: NAME.to_string(),
            key_present,
            error: if valid {
                None
            } else if key_present {
                Some("openai rejected the configured API key".to_string())
            } else {
                Some("no API key configured".to_string())
            },
        }
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        let payload = self.build_payload(request)?;

        if !self.breaker.allow_request() {
            return Err(ProviderError::circuit_open(NAME));
        }
        let result =
            retry::execute(&self.config.retry, || self.client.chat_completions(&payload)).await;
        match result {
            Ok(raw) => {
                self.breaker.record_success();
                self.parse_response(request, raw)
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
        let mut payload = self.build_payload(request)?;
        payload["stream"] = json!(true);

        if !self.breaker.allow_request() {
            return Err(ProviderError::circuit_open(NAME));
        }
        let opened =
            retry::execute(&self.config.retry, || self.client.open_chat_stream(&payload)).await;
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
        let initial = ModelResponse::new(
            NAME,
            model.clone(),
            "",
            TokenUsage::zero(),
            CostEstimate::zero(),
        );

        let handler = StreamHandler::from_byte_stream(
            NAME,
            model,
            initial.clone(),
            self.pricing.clone(),
            response.bytes_stream(),
            Box::new(OpenAIChunkDecoder),
        );
        handler.start();
        Ok((initial, handler))
    }

    fn calculate_token_usage(&self, request: &ModelRequest, raw: &Value) -> TokenUsage {
        let input = raw
            .pointer("/usage/prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or_else(|| estimate_tokens(&request.flattened_text()));
        let output = raw
            .pointer("/usage/completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or_else(|| {
                let generated = raw
                    .pointer("/choices/0/message/content")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                estimate_tokens(generated)
            });
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
            Capability::Reasoning => CapabilityStrength::Strong,
            Capability::CodeGeneration => CapabilityStrength::Strong,
            Capability::Vision => CapabilityStrength::Strong,
            Capability::Conversation => CapabilityStrength::Strong,
            Capability::CreativeWriting => CapabilityStrength::Moderate,
            Capability::Math => CapabilityStrength::Moderate,
            Capability::Local | Capability::Inexpensive => CapabilityStrength::None,
        }
    }
}
