//! Multi-provider orchestration: health-aware selection and fallback

pub mod health;
pub mod selection;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::providers::capabilities::{Capability, CapabilityStrength};
use crate::core::providers::error::{ProviderAttempt, ProviderError};
use crate::core::providers::{KeyValidation, ModelProvider, estimate_tokens};
use crate::core::recovery::retry::backoff_delay;
use crate::core::recovery::types::RetryPolicy;
use crate::core::streaming::StreamHandler;
use crate::core::types::request::ModelRequest;
use crate::core::types::response::{CostEstimate, ModelResponse, TokenUsage};

pub use health::{ProviderHealth, UNHEALTHY_THRESHOLD};
pub use selection::SelectionStrategy;

use health::HealthBoard;
use selection::SelectionContext;

struct GroupState {
    health: HealthBoard,
    context: SelectionContext,
}

/// N adapters behind the single-adapter contract
///
/// Candidates are the healthy members (all members as a last resort),
/// ordered by the configured strategy; each is tried in turn with the
/// group's cross-provider backoff between attempts. The group mutex only
/// guards counters and the strategy cursor, never any I/O.
pub struct ProviderGroup {
    providers: Vec<Arc<dyn ModelProvider>>,
    name: String,
    model_name: String,
    strategy: SelectionStrategy,
    retry_policy: RetryPolicy,
    state: Mutex<GroupState>,
}

impl ProviderGroup {
    pub fn new(
        providers: Vec<Arc<dyn ModelProvider>>,
        strategy: SelectionStrategy,
    ) -> Result<Self, ProviderError> {
        if providers.is_empty() {
            return Err(ProviderError::no_providers("provider_group"));
        }

        // Try each remaining provider once, with short pauses between.
        let retry_policy = RetryPolicy {
            max_retries: providers.len() as u32 - 1,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            jitter: 0.1,
            ..RetryPolicy::default()
        };

        let member_count = providers.len();
        let model_name = providers[0].model_name().to_string();
        Ok(Self {
            providers,
            name: "provider_group".to_string(),
            model_name,
            strategy,
            retry_policy,
            state: Mutex::new(GroupState {
                health: HealthBoard::new(member_count),
                context: SelectionContext::default(),
            }),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the cross-provider fallback policy (distinct from each
    /// adapter's own retry engine).
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn providers(&self) -> &[Arc<dyn ModelProvider>] {
        &self.providers
    }

    /// Health snapshot in member order.
    pub fn health(&self) -> Vec<ProviderHealth> {
        self.state.lock().health.snapshot()
    }

    /// Order the candidates for one request: healthy members first
    /// choice, every member when none are healthy.
    fn select(&self, request: &ModelRequest) -> Vec<usize> {
        let mut state = self.state.lock();
        let mut candidates = state.health.healthy_indices();
        if candidates.is_empty() {
            warn!(group = %self.name, "no healthy providers, trying all members");
            candidates = (0..self.providers.len()).collect();
        }
        self.strategy
            .order(&candidates, &self.providers, &mut state.context, request)
    }

    fn record(&self, index: usize, success: bool) {
        let provider = self.providers[index].name().to_string();
        self.state.lock().health.record(index, &provider, success);
    }

    async fn sleep_between_candidates(&self, attempt: u32) {
        if !self.retry_policy.enabled {
            return;
        }
        let delay = backoff_delay(attempt, &self.retry_policy);
        if !delay.is_zero() {
            debug!(group = %self.name, delay_ms = delay.as_millis() as u64, "pausing before next provider");
            tokio::time::sleep(delay).await;
        }
    }

    fn member_by_name(&self, name: &str) -> Option<&Arc<dyn ModelProvider>> {
        self.providers.iter().find(|p| p.name() == name)
    }
}

#[async_trait]
impl ModelProvider for ProviderGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Best-effort union across members; individual failures are logged,
    /// not fatal.
    async fn get_available_models(&self) -> Result<Vec<String>, ProviderError> {
        let mut all = BTreeSet::new();
        for provider in &self.providers {
            match provider.get_available_models().await {
                Ok(models) => all.extend(models),
                Err(error) => {
                    warn!(provider = provider.name(), %error, "failed to list models");
                }
            }
        }
        Ok(all.into_iter().collect())
    }

    /// True when at least one member validates.
    async fn validate_api_key(&self) -> bool {
        for provider in &self.providers {
            if provider.validate_api_key().await {
                return true;
            }
        }
        false
    }

    async fn validate_api_key_detailed(&self) -> KeyValidation {
        let mut key_present = false;
        let mut valid = false;
        for provider in &self.providers {
            let detail = provider.validate_api_key_detailed().await;
            key_present |= detail.key_present;
            valid |= detail.valid;
        }
        KeyValidation {
            valid,
            provider: self.name.clone(),
            key_present,
            error: if valid {
                None
            } else {
                Some("no provider in the group validated".to_string())
            },
        }
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        let order = self.select(request);
        if order.is_empty() {
            return Err(ProviderError::no_providers(self.name.clone()));
        }

        let total = order.len();
        let mut attempts = Vec::new();
        for (position, index) in order.into_iter().enumerate() {
            let provider = &self.providers[index];
            debug!(
                group = %self.name,
                provider = provider.name(),
                attempt = position + 1,
                total,
                "dispatching generate"
            );
            match provider.generate(request).await {
                Ok(response) => {
                    self.record(index, true);
                    return Ok(response);
                }
                Err(error) => {
                    self.record(index, false);
                    warn!(provider = provider.name(), %error, "provider failed");
                    attempts.push(ProviderAttempt {
                        provider: provider.name().to_string(),
                        error: error.to_string(),
                    });
                    if position + 1 < total {
                        self.sleep_between_candidates(position as u32 + 1).await;
                    }
                }
            }
        }

        Err(ProviderError::all_failed(self.name.clone(), attempts))
    }

    async fn stream(
        &self,
        request: &ModelRequest,
    ) -> Result<(ModelResponse, StreamHandler), ProviderError> {
        let order = self.select(request);
        if order.is_empty() {
            return Err(ProviderError::no_providers(self.name.clone()));
        }

        let total = order.len();
        let mut attempts = Vec::new();
        for (position, index) in order.into_iter().enumerate() {
            let provider = &self.providers[index];
            debug!(
                group = %self.name,
                provider = provider.name(),
                attempt = position + 1,
                total,
                "dispatching stream"
            );
            match provider.stream(request).await {
                Ok(opened) => {
                    self.record(index, true);
                    return Ok(opened);
                }
                Err(error) => {
                    self.record(index, false);
                    warn!(provider = provider.name(), %error, "provider failed to open stream");
                    attempts.push(ProviderAttempt {
                        provider: provider.name().to_string(),
                        error: error.to_string(),
                    });
                    if position + 1 < total {
                        self.sleep_between_candidates(position as u32 + 1).await;
                    }
                }
            }
        }

        Err(ProviderError::all_failed(self.name.clone(), attempts))
    }

    /// Delegate to the member that produced the response (by the raw
    /// `provider` field), falling back to the first member, then to the
    /// generic character heuristic.
    fn calculate_token_usage(&self, request: &ModelRequest, raw: &Value) -> TokenUsage {
        let produced_by = raw.get("provider").and_then(Value::as_str).unwrap_or("");
        if let Some(owner) = self.member_by_name(produced_by) {
            return owner.calculate_token_usage(request, raw);
        }
        if let Some(first) = self.providers.first() {
            return first.calculate_token_usage(request, raw);
        }
        TokenUsage::from_counts(
            estimate_tokens(&request.flattened_text()),
            estimate_tokens(raw.get("content").and_then(Value::as_str).unwrap_or_default()),
        )
    }

    /// Delegate to the member whose selected model matches, else the
    /// first member. Cost can be misattributed in heterogeneous groups;
    /// ask the owning adapter directly when exact accounting matters.
    fn calculate_cost(&self, usage: &TokenUsage, model: &str) -> CostEstimate {
        if let Some(owner) = self.providers.iter().find(|p| p.model_name() == model) {
            return owner.calculate_cost(usage, model);
        }
        match self.providers.first() {
            Some(first) => first.calculate_cost(usage, model),
            None => CostEstimate::zero(),
        }
    }

    /// Maximum strength across the currently healthy members.
    fn get_capability_strength(&self, capability: Capability) -> CapabilityStrength {
        let healthy = {
            let state = self.state.lock();
            state.health.healthy_indices()
        };
        let candidates: Vec<usize> = if healthy.is_empty() {
            (0..self.providers.len()).collect()
        } else {
            healthy
        };
        candidates
            .into_iter()
            .map(|index| self.providers[index].get_capability_strength(capability))
            .max()
            .unwrap_or(CapabilityStrength::None)
    }
}
