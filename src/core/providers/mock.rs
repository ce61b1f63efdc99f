//! In-memory adapter with scriptable outcomes
//!
//! Used by provider-group and capability tests, and as the cheapest rung
//! of the cost-optimized ordering. Replies and failures can be scripted
//! per call; capability strengths are configurable.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::capabilities::{Capability, CapabilityStrength};
use super::error::ProviderError;
use super::pricing::PriceTable;
use super::{KeyValidation, ModelProvider, estimate_tokens};
use crate::core::streaming::StreamHandler;
use crate::core::types::request::ModelRequest;
use crate::core::types::response::{CostEstimate, ModelResponse, TokenUsage};
use crate::core::validation::Validate;

pub struct MockProvider {
    name: String,
    model: String,
    reply: String,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    failure: Option<ProviderError>,
    capabilities: HashMap<Capability, CapabilityStrength>,
    calls: AtomicU64,
}

impl MockProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            name: "mock".to_string(),
            model: model.into(),
            reply: "mock response".to_string(),
            script: Mutex::new(VecDeque::new()),
            failure: None,
            capabilities: HashMap::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// Masquerade under another provider name (for ordering tests).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    /// Queue one scripted outcome; consumed in order before the default
    /// reply applies.
    pub fn with_result(self, result: Result<String, ProviderError>) -> Self {
        self.script.lock().push_back(result);
        self
    }

    /// Fail every unscripted call with a clone of this error.
    pub fn always_failing(mut self, error: ProviderError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn with_capability(mut self, capability: Capability, strength: CapabilityStrength) -> Self {
        self.capabilities.insert(capability, strength);
        self
    }

    /// Number of generate/stream calls observed.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.reply.clone()),
        }
    }

    fn build_response(&self, request: &ModelRequest, content: String) -> ModelResponse {
        let usage = TokenUsage::from_counts(
            estimate_tokens(&request.flattened_text()),
            estimate_tokens(&content),
        );
        ModelResponse::new(self.name.clone(), self.model.clone(), content, usage, CostEstimate::zero())
            .with_finish_reason("stop")
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn get_available_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec![self.model.clone()])
    }

    async fn validate_api_key(&self) -> bool {
        true
    }

    async fn validate_api_key_detailed(&self) -> KeyValidation {
        KeyValidation {
            valid: true,
            provider: self.name.clone(),
            key_present: true,
            error: None,
        }
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        request.validate().map_err(ProviderError::validation)?;
        let content = self.next_outcome()?;
        Ok(self.build_response(request, content))
    }

    async fn stream(
        &self,
        request: &ModelRequest,
    ) -> Result<(ModelResponse, StreamHandler), ProviderError> {
        request.validate().map_err(ProviderError::validation)?;
        let content = self.next_outcome()?;

        let initial = ModelResponse::new(
            self.name.clone(),
            self.model.clone(),
            "",
            TokenUsage::zero(),
            CostEstimate::zero(),
        );
        // stream the reply one word at a time
        let chunks: Vec<String> = content
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        let handler = StreamHandler::from_script(
            "mock",
            self.model.clone(),
            initial.clone(),
            PriceTable::free(),
            chunks,
        );
        handler.start();
        Ok((initial, handler))
    }

    fn calculate_token_usage(&self, request: &ModelRequest, raw: &Value) -> TokenUsage {
        let generated = raw
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        TokenUsage::from_counts(
            estimate_tokens(&request.flattened_text()),
            estimate_tokens(generated),
        )
    }

    fn calculate_cost(&self, _usage: &TokenUsage, _model: &str) -> CostEstimate {
        CostEstimate::zero()
    }

    fn get_capability_strength(&self, capability: Capability) -> CapabilityStrength {
        self.capabilities
            .get(&capability)
            .copied()
            .unwrap_or(CapabilityStrength::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::message::ModelMessage;

    fn request() -> ModelRequest {
        ModelRequest::new(vec![ModelMessage::user("hi")]).unwrap()
    }

    #[tokio::test]
    async fn test_default_reply() {
        let mock = MockProvider::new("mock-basic");
        let response = mock.generate(&request()).await.unwrap();
        assert_eq!(response.content, "mock response");
        assert_eq!(response.provider, "mock");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_outcomes_run_in_order() {
        let mock = MockProvider::new("mock-basic")
            .with_result(Err(ProviderError::timeout("mock", "scripted")))
            .with_result(Ok("second".to_string()));

        assert!(mock.generate(&request()).await.is_err());
        assert_eq!(mock.generate(&request()).await.unwrap().content, "second");
        // script exhausted, default reply returns
        assert_eq!(
            mock.generate(&request()).await.unwrap().content,
            "mock response"
        );
    }

    #[tokio::test]
    async fn test_always_failing() {
        let mock =
            MockProvider::new("mock-basic").always_failing(ProviderError::server("mock", 500, "down"));
        assert!(mock.generate(&request()).await.is_err());
        assert!(mock.generate(&request()).await.is_err());
    }

    #[tokio::test]
    async fn test_stream_delivers_reply() {
        let mock = MockProvider::new("mock-basic").with_reply("alpha beta gamma");
        let (_, handler) = mock.stream(&request()).await.unwrap();
        let response = handler.process_stream(|_, _| {}).await.unwrap();
        assert_eq!(response.content, "alpha beta gamma");
    }

    #[test]
    fn test_capability_configuration() {
        let mock = MockProvider::new("mock-premium")
            .with_capability(Capability::Reasoning, CapabilityStrength::Strong);
        assert_eq!(
            mock.get_capability_strength(Capability::Reasoning),
            CapabilityStrength::Strong
        );
        assert_eq!(
            mock.get_capability_strength(Capability::Vision),
            CapabilityStrength::None
        );
    }
}
