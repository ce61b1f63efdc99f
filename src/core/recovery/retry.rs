//! Retry engine with exponential backoff and jitter

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::types::RetryPolicy;
use crate::core::providers::error::ProviderError;

/// Delay before retry attempt `n` (1-indexed):
/// `min(min_delay * backoff_factor^(n-1), max_delay) * (1 + uniform(0, jitter))`.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    backoff_delay_with(attempt, policy, rand::random::<f64>())
}

/// Deterministic core of [`backoff_delay`]; `unit` is the jitter draw in `[0, 1)`.
pub fn backoff_delay_with(attempt: u32, policy: &RetryPolicy, unit: f64) -> Duration {
    let attempt = attempt.max(1);
    let exponent = (attempt - 1) as i32;
    let base = policy.min_delay.as_secs_f64() * policy.backoff_factor.powi(exponent);
    let capped = base.min(policy.max_delay.as_secs_f64());
    let jittered = capped * (1.0 + policy.jitter * unit);
    Duration::from_secs_f64(jittered)
}

/// Drive a unit of work through the retry policy.
///
/// The work is invoked once, then re-invoked after a backoff sleep for each
/// retryable failure, up to `max_retries`. A non-retryable failure or an
/// exhausted budget re-raises the last error. The sleep is a plain tokio
/// sleep, so dropping the returned future cancels the backoff.
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, mut work: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match work().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "retry succeeded");
                }
                return Ok(value);
            }
            Err(error) => {
                if !policy.enabled || attempt >= policy.max_retries || !policy.is_retryable(&error)
                {
                    debug!(attempt = attempt + 1, %error, "not retrying");
                    return Err(error);
                }

                attempt += 1;
                let delay = backoff_delay(attempt, policy);
                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "retryable error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter: 0.0,
            ..RetryPolicy::default()
        }
    }

    // ==================== Delay Formula Tests ====================

    #[test]
    fn test_delay_exponential_shape_without_jitter() {
        let policy = RetryPolicy {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: 0.0,
            ..RetryPolicy::default()
        };

        assert_eq!(backoff_delay_with(1, &policy, 0.9), Duration::from_millis(500));
        assert_eq!(backoff_delay_with(2, &policy, 0.9), Duration::from_millis(1000));
        assert_eq!(backoff_delay_with(3, &policy, 0.9), Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = RetryPolicy {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            backoff_factor: 10.0,
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(backoff_delay_with(5, &policy, 0.0), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_jitter_bounds() {
        let policy = RetryPolicy {
            min_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            jitter: 0.25,
            ..RetryPolicy::default()
        };

        let lower = backoff_delay_with(2, &policy, 0.0);
        let upper = backoff_delay_with(2, &policy, 1.0);
        assert_eq!(lower, Duration::from_secs(2));
        assert_eq!(upper, Duration::from_millis(2500));

        for draw in [0.1, 0.5, 0.99] {
            let delay = backoff_delay_with(2, &policy, draw);
            assert!(delay >= lower && delay <= upper, "draw {draw} out of bounds");
        }
    }

    // ==================== Execution Tests ====================

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = execute(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProviderError>(7) }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = execute(&fast_policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::rate_limit("mock", None))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::authentication("mock", "bad key")) }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Authentication { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::server("mock", 503, "down")) }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::Server { status: 503, .. })));
        // one initial attempt plus max_retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_disabled_policy_never_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute(&RetryPolicy::disabled(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::rate_limit("mock", None)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_status_code_allow_list() {
        let mut policy = fast_policy();
        policy.retryable_status_codes = vec![418];

        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::api("mock", 418, "teapot", false)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
