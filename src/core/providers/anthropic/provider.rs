//! Anthropic adapter

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::client::AnthropicClient;
use super::config::AnthropicConfig;
use super::streaming::AnthropicChunkDecoder;
use super::{NAME, price_table};
use crate::core::providers::capabilities::{Capability, CapabilityStrength};
use crate::core::providers::error::ProviderError;
use crate::core::providers::{KeyValidation, ModelProvider, estimate_tokens};
use crate::core::providers::pricing::PriceTable;
use crate::core::recovery::circuit_breaker::CircuitBreaker;
use crate::core::recovery::retry;
use crate::core::streaming::StreamHandler;
use crate::core::types::request::ModelRequest;
use crate::core::types::response::{CostEstimate, ModelResponse, TokenUsage};
use crate::core::validation::Validate;

/// Static model catalog; Anthropic exposes no listing endpoint.
const AVAILABLE_MODELS: &[&str] = &[
    "claude-3-7-sonnet-20250219",
    "claude-3-5-sonnet-20240620",
    "claude-3-5-haiku-20240620",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

/// Cheapest model, used for the one-token key probe.
const PROBE_MODEL: &str = "claude-3-haiku-20240307";

pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: AnthropicClient,
    breaker: CircuitBreaker,
    pricing: PriceTable,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self, ProviderError> {
        let client = AnthropicClient::new(config.clone())?;
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Ok(Self {
            config,
            client,
            breaker,
            pricing: price_table(),
        })
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(AnthropicConfig::from_env()?)
    }

    fn build_payload(&self, request: &ModelRequest) -> Result<Value, ProviderError> {
        request
            .validate()
            .map_err(|report| ProviderError::validation_for(NAME, report))?;

        let mut payload = request.to_provider_request(NAME);
        payload["model"] = json!(self.request_model(request));
        // the messages API requires max_tokens
        if payload.get("max_tokens").is_none() {
            payload["max_tokens"] = json!(self.config.max_tokens);
        }
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
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ProviderError::api(NAME, None, "response missing content array", false)
            })?
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<String>();

        let model = raw
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.request_model(request));

        let usage = self.calculate_token_usage(request, &raw);
        let cost = self.calculate_cost(&usage, &model);

        let mut response = ModelResponse::new(NAME, model, content, usage, cost);
        if let Some(stop_reason) = raw.get("stop_reason").and_then(Value::as_str) {
            response = response.with_finish_reason(stop_reason);
        }
        Ok(response.with_raw_response(raw))
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    async fn get_available_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(AVAILABLE_MODELS.iter().map(ToString::to_string).collect())
    }

    async fn validate_api_key(&self) -> bool {
        if self.config.api_key.is_none() {
            return false;
        }
        let probe = json!({
            "model": PROBE_MODEL,
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "Say A"}],
        });
        match self.client.send_messages(&probe).await {
            Ok(_) => {
                info!("anthropic API key validated");
                true
            }
            Err(error) => {
                tracing::warn!(%error, "anthropic API key validation failed");
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
                Some("anthropic rejected the configured API key".to_string())
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
        let result = retry::execute(&self.config.retry, || self.client.send_messages(&payload)).await;
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
        let opened = retry::execute(&self.config.retry, || {
            self.client.open_message_stream(&payload)
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
            Box::new(AnthropicChunkDecoder),
        );
        handler.start();
        Ok((initial, handler))
    }

    fn calculate_token_usage(&self, request: &ModelRequest, raw: &Value) -> TokenUsage {
        let input = raw.pointer("/usage/input_tokens").and_then(Value::as_u64);
        let output = raw.pointer("/usage/output_tokens").and_then(Value::as_u64);

        let input = input.unwrap_or_else(|| estimate_tokens(&request.flattened_text()));
        let output = output.unwrap_or_else(|| {
            let generated = raw
                .get("content")
                .and_then(Value::as_array)
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter_map(|b| b.get("text").and_then(Value::as_str))
                        .collect::<String>()
                })
                .unwrap_or_default();
            estimate_tokens(&generated)
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
            Capability::Reasoning => CapabilityStrength::Exceptional,
            Capability::CreativeWriting => CapabilityStrength::Strong,
            Capability::CodeGeneration => CapabilityStrength::Strong,
            Capability::Math => CapabilityStrength::Strong,
            Capability::Conversation => CapabilityStrength::Strong,
            Capability::Vision => CapabilityStrength::Moderate,
            Capability::Local | Capability::Inexpensive => CapabilityStrength::None,
        }
    }
}
