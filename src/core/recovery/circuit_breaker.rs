//! Per-provider circuit breaker
//!
//! Closed: requests pass, consecutive failures count up. Open: requests
//! fast-fail until the recovery timeout elapses. Half-open: a bounded test
//! budget probes the backend; one success closes the breaker, one failure
//! reopens it. The `allow_request` gate runs before the retry envelope, so
//! an open circuit short-circuits with zero backoff.

use std::future::Future;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::types::{BreakerSnapshot, CircuitBreakerConfig, CircuitState};
use crate::core::providers::error::ProviderError;

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    test_requests_remaining: u32,
}

/// Three-state failure latch guarding one backend
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                test_requests_remaining: 0,
            }),
        }
    }

    /// Whether a request may proceed right now.
    ///
    /// An open breaker flips to half-open once the recovery timeout has
    /// elapsed since the last failure; half-open admission spends the test
    /// budget.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let recovered = inner
                .last_failure
                .is_some_and(|at| at.elapsed() >= self.config.recovery_timeout);
            if recovered {
                info!("circuit breaker entering half-open state after recovery timeout");
                inner.state = CircuitState::HalfOpen;
                inner.test_requests_remaining = self.config.test_requests;
            } else {
                return false;
            }
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.test_requests_remaining > 0 {
                inner.test_requests_remaining -= 1;
                return true;
            }
            return false;
        }

        true
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                debug!("circuit breaker closing after successful test request");
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.test_requests_remaining = 0;
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                debug!("circuit breaker reopening after failed test request");
                inner.state = CircuitState::Open;
                inner.test_requests_remaining = 0;
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        failures = inner.failure_count,
                        "circuit breaker tripped after consecutive failures"
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            test_requests_remaining: inner.test_requests_remaining,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.test_requests_remaining = 0;
        debug!("circuit breaker reset");
    }

    /// Run a unit of work behind the breaker, recording the outcome.
    pub async fn call<T, Fut>(&self, provider: &'static str, work: Fut) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if !self.allow_request() {
            return Err(ProviderError::circuit_open(provider));
        }
        match work.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quick_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(20),
            test_requests: 1,
        }
    }

    // ==================== State Transition Tests ====================

    #[test]
    fn test_starts_closed() {
        let breaker = CircuitBreaker::new(quick_config());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(quick_config());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_success_resets_failure_count_while_closed() {
        let breaker = CircuitBreaker::new(quick_config());
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.snapshot().failure_count, 0);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let breaker = CircuitBreaker::new(quick_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(!breaker.allow_request());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_budget_is_bounded() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            test_requests: 2,
            ..quick_config()
        });
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));

        assert!(breaker.allow_request());
        assert!(breaker.allow_request());
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_success_from_half_open_closes() {
        let breaker = CircuitBreaker::new(quick_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_request());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failure_count, 0);
    }

    #[test]
    fn test_failure_from_half_open_reopens() {
        let breaker = CircuitBreaker::new(quick_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_reset() {
        let breaker = CircuitBreaker::new(quick_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    // ==================== Call Wrapper Tests ====================

    #[tokio::test]
    async fn test_call_records_outcomes() {
        let breaker = CircuitBreaker::new(quick_config());

        let ok = breaker.call("mock", async { Ok::<_, ProviderError>(1) }).await;
        assert_eq!(ok.unwrap(), 1);

        for _ in 0..3 {
            let _ = breaker
                .call("mock", async {
                    Err::<(), _>(ProviderError::server("mock", 500, "boom"))
                })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_call_fast_fails_when_open() {
        let breaker = CircuitBreaker::new(quick_config());
        for _ in 0..3 {
            breaker.record_failure();
        }

        let result = breaker.call("mock", async { Ok::<_, ProviderError>(()) }).await;
        let error = result.unwrap_err();
        assert!(error.to_string().contains("circuit open"));
        assert!(!error.retry_possible());
    }
}
