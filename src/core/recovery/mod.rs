//! Reliability primitives: retry with backoff and circuit breaking

pub mod circuit_breaker;
pub mod retry;
pub mod types;

pub use circuit_breaker::CircuitBreaker;
pub use retry::{backoff_delay, backoff_delay_with, execute};
pub use types::{BreakerSnapshot, CircuitBreakerConfig, CircuitState, RetryPolicy};
