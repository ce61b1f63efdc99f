//! Response records: token usage, cost estimates, and model responses

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::core::validation::{Validate, ValidationReport};

/// Tolerance used when checking the additivity of cost estimates.
pub const COST_TOLERANCE: f64 = 1e-10;

/// Token counts for one request/response pair
///
/// Invariant: `total_tokens = input_tokens + output_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64, total_tokens: u64) -> Result<Self, ValidationReport> {
        let usage = Self::new_unchecked(input_tokens, output_tokens, total_tokens);
        usage.validate()?;
        Ok(usage)
    }

    pub(crate) fn new_unchecked(input_tokens: u64, output_tokens: u64, total_tokens: u64) -> Self {
        TokenUsage {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Build from the two counts, deriving the total.
    pub fn from_counts(input_tokens: u64, output_tokens: u64) -> Self {
        Self::new_unchecked(input_tokens, output_tokens, input_tokens + output_tokens)
    }

    pub fn zero() -> Self {
        Self::from_counts(0, 0)
    }
}

impl fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in / {} out / {} total",
            self.input_tokens, self.output_tokens, self.total_tokens
        )
    }
}

/// Dollar cost estimate for one request/response pair
///
/// Invariant: `total_cost = input_cost + output_cost` within [`COST_TOLERANCE`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl CostEstimate {
    pub fn new(input_cost: f64, output_cost: f64, total_cost: f64) -> Result<Self, ValidationReport> {
        let cost = Self::new_unchecked(input_cost, output_cost, total_cost);
        cost.validate()?;
        Ok(cost)
    }

    pub(crate) fn new_unchecked(input_cost: f64, output_cost: f64, total_cost: f64) -> Self {
        CostEstimate {
            input_cost,
            output_cost,
            total_cost,
        }
    }

    /// Build from the two parts, deriving the total.
    pub fn from_parts(input_cost: f64, output_cost: f64) -> Self {
        Self::new_unchecked(input_cost, output_cost, input_cost + output_cost)
    }

    pub fn zero() -> Self {
        Self::from_parts(0.0, 0.0)
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.6} total", self.total_cost)
    }
}

/// Final or evolving result of one model call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub usage: TokenUsage,
    pub cost: CostEstimate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

impl ModelResponse {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        content: impl Into<String>,
        usage: TokenUsage,
        cost: CostEstimate,
    ) -> Self {
        ModelResponse {
            content: content.into(),
            model: model.into(),
            provider: provider.into(),
            usage,
            cost,
            finish_reason: None,
            raw_response: None,
        }
    }

    pub fn with_finish_reason(mut self, finish_reason: impl Into<String>) -> Self {
        self.finish_reason = Some(finish_reason.into());
        self
    }

    pub fn with_raw_response(mut self, raw: Value) -> Self {
        self.raw_response = Some(raw);
        self
    }
}
