//! Types and configurations for the recovery layer

use std::time::Duration;

use crate::core::providers::error::ProviderError;

/// Policy governing retry behavior around a unit of work
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Whether retries happen at all
    pub enabled: bool,
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,
    /// Delay before the first retry
    pub min_delay: Duration,
    /// Cap applied to the exponential delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
    /// Jitter fraction: the delay grows by up to this share of itself
    pub jitter: f64,
    /// HTTP status codes that warrant a retry
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: 0.1,
            retryable_status_codes: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether an error should trigger another attempt: either the error
    /// itself hints so (rate limit, timeout, retryable API error), or its
    /// status code is on the allow-list.
    pub fn is_retryable(&self, error: &ProviderError) -> bool {
        if error.retry_possible() {
            return true;
        }
        if let Some(status) = error.status_code() {
            return self.retryable_status_codes.contains(&status);
        }
        false
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// Cooldown before an open breaker admits test traffic
    pub recovery_timeout: Duration,
    /// Requests admitted while half-open
    pub test_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            test_requests: 1,
        }
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected until the cooldown elapses
    Open,
    /// A limited number of test requests probe the backend
    HalfOpen,
}

/// Point-in-time view of a breaker, for metrics and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub test_requests_remaining: u32,
}
