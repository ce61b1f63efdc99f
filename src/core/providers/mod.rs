//! Provider adapters and the contract they share

pub mod anthropic;
pub mod capabilities;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod pricing;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::streaming::StreamHandler;
use crate::core::types::request::ModelRequest;
use crate::core::types::response::{CostEstimate, ModelResponse, TokenUsage};

pub use capabilities::{Capability, CapabilityStrength, TaskType};
pub use error::{ErrorSeverity, ProviderAttempt, ProviderError};
pub use pricing::{PriceRow, PriceTable};

/// Detailed result of an API-key check
#[derive(Debug, Clone, Serialize)]
pub struct KeyValidation {
    pub valid: bool,
    pub provider: String,
    pub key_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The contract every backend adapter (and the provider group) fulfills
///
/// `generate` and `stream` run the full reliability envelope: validation,
/// request translation, circuit-breaker gate, retry loop, response parsing,
/// and token/cost accounting. Errors always surface as [`ProviderError`].
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable identifier used for routing, accounting, and logs.
    fn name(&self) -> &str;

    /// Currently selected model.
    fn model_name(&self) -> &str;

    /// Models this backend can serve right now.
    async fn get_available_models(&self) -> Result<Vec<String>, ProviderError>;

    /// Cheap credential probe.
    async fn validate_api_key(&self) -> bool;

    /// Credential probe with a structured verdict.
    async fn validate_api_key_detailed(&self) -> KeyValidation;

    /// One-shot completion.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError>;

    /// Streaming completion: the initial (empty) response plus the live
    /// handler, with the producer already started.
    async fn stream(
        &self,
        request: &ModelRequest,
    ) -> Result<(ModelResponse, StreamHandler), ProviderError>;

    /// Backend-specific token accounting over a raw response body.
    fn calculate_token_usage(&self, request: &ModelRequest, raw: &Value) -> TokenUsage;

    /// Cost of a usage under this backend's price table.
    fn calculate_cost(&self, usage: &TokenUsage, model: &str) -> CostEstimate;

    /// Declared strength on one capability axis.
    fn get_capability_strength(&self, capability: Capability) -> CapabilityStrength {
        let _ = capability;
        CapabilityStrength::None
    }
}

/// Character-count token estimate shared by adapters when a backend
/// reports no counts: roughly four characters per token.
pub(crate) fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}
