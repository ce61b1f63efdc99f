//! # atlas-gateway
//!
//! A unified gateway to heterogeneous LLM backends. A backend-agnostic
//! [`ModelRequest`] goes in; the gateway routes it to one of several
//! adapters (Anthropic, OpenAI, Ollama) or to a [`ProviderGroup`] that
//! selects among them, and a [`ModelResponse`] or a live [`StreamHandler`]
//! comes back. Every call runs behind explicit reliability machinery:
//! schema validation at the boundary, a per-adapter retry engine with
//! exponential backoff and jitter, a per-adapter circuit breaker, and
//! health-tracked fallback across a group.
//!
//! ## Single adapter
//!
//! ```rust,no_run
//! use atlas_gateway::{AnthropicProvider, ModelMessage, ModelProvider, ModelRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = AnthropicProvider::from_env()?;
//!     let request = ModelRequest::builder()
//!         .system_prompt("You are a helpful assistant.")
//!         .message(ModelMessage::user("What is the capital of France?"))
//!         .max_tokens(256)
//!         .build()?;
//!
//!     let response = provider.generate(&request).await?;
//!     println!("{} ({})", response.content, response.cost);
//!     Ok(())
//! }
//! ```
//!
//! ## Provider group with fallback
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use atlas_gateway::{
//!     AnthropicProvider, ModelMessage, ModelProvider, ModelRequest, OllamaProvider,
//!     ProviderGroup, SelectionStrategy,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let group = ProviderGroup::new(
//!         vec![
//!             Arc::new(AnthropicProvider::from_env()?),
//!             Arc::new(OllamaProvider::from_env()?),
//!         ],
//!         SelectionStrategy::TaskAware,
//!     )?;
//!
//!     let request = ModelRequest::builder()
//!         .message(ModelMessage::user("Prove that √2 is irrational."))
//!         .build()?;
//!
//!     // streamed: chunks arrive in producer order
//!     let (_, handler) = group.stream(&request).await?;
//!     let finished = handler
//!         .process_stream(|chunk, _| print!("{chunk}"))
//!         .await?;
//!     println!("\n[{} tokens]", finished.usage.total_tokens);
//!     Ok(())
//! }
//! ```

pub mod core;

pub use crate::core::group::{ProviderGroup, ProviderHealth, SelectionStrategy};
pub use crate::core::providers::anthropic::{AnthropicConfig, AnthropicProvider};
pub use crate::core::providers::mock::MockProvider;
pub use crate::core::providers::ollama::{OllamaConfig, OllamaProvider};
pub use crate::core::providers::openai::{OpenAIConfig, OpenAIProvider};
pub use crate::core::providers::{
    Capability, CapabilityStrength, ErrorSeverity, KeyValidation, ModelProvider, PriceRow,
    PriceTable, ProviderAttempt, ProviderError, TaskType,
};
pub use crate::core::recovery::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryPolicy,
};
pub use crate::core::streaming::{StreamHandler, StreamMetrics, StreamState};
pub use crate::core::types::{
    COST_TOLERANCE, Content, CostEstimate, ImageDetail, MessageContent, MessageRole, ModelMessage,
    ModelRequest, ModelResponse, TokenUsage,
};
pub use crate::core::validation::{Validate, ValidationIssue, ValidationReport};
