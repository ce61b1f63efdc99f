//! Unified provider error taxonomy
//!
//! Every adapter translates its transport and backend failures into this
//! single type before anything escapes to a caller. Downstream code (retry
//! engine, circuit breaker, provider group) operates on this taxonomy only.

use std::fmt;

use crate::core::validation::ValidationReport;

/// Severity attached to backend-signalled errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorSeverity {
    Warning,
    #[default]
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorSeverity::Warning => "warning",
            ErrorSeverity::Error => "error",
            ErrorSeverity::Critical => "critical",
        })
    }
}

/// One failed candidate inside a provider-group fallback run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: String,
    pub error: String,
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

fn format_attempts(attempts: &[ProviderAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn provider_suffix(provider: &Option<&'static str>) -> String {
    provider.map(|p| format!(" for {p}")).unwrap_or_default()
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Unified error type for the provider layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Schema or option validation failed; fatal to the call.
    #[error("validation failed{}: {report}", provider_suffix(.provider))]
    Validation {
        provider: Option<&'static str>,
        report: ValidationReport,
    },

    /// Credentials invalid or missing; never retryable.
    #[error("authentication failed for {provider}: {message}")]
    Authentication {
        provider: &'static str,
        message: String,
    },

    /// Backend-signalled error outside the more specific kinds below.
    #[error("API error for {provider}{}: {message}", status_suffix(.status))]
    Api {
        provider: &'static str,
        status: Option<u16>,
        message: String,
        retry_possible: bool,
        severity: ErrorSeverity,
    },

    /// HTTP 429; retryable after a delay.
    #[error("rate limit exceeded for {provider}: {message}")]
    RateLimit {
        provider: &'static str,
        message: String,
        retry_after: Option<u64>,
    },

    /// Backend 5xx; retryable per the status allow-list.
    #[error("server error for {provider} (status {status}): {message}")]
    Server {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Network timeout; retryable.
    #[error("timeout for {provider}: {message}")]
    Timeout {
        provider: &'static str,
        message: String,
    },

    /// Failure observed while producing or parsing a stream.
    #[error("streaming error for {provider}: {message}")]
    Stream {
        provider: &'static str,
        message: String,
    },

    /// Aggregate raised by a provider group once every candidate failed.
    #[error("all providers failed for {group}: {}", format_attempts(.attempts))]
    AllProvidersFailed {
        group: String,
        attempts: Vec<ProviderAttempt>,
    },

    /// A group had nothing to dispatch to.
    #[error("no providers available for {group}")]
    NoProvidersAvailable { group: String },
}

impl ProviderError {
    pub fn validation(report: ValidationReport) -> Self {
        ProviderError::Validation {
            provider: None,
            report,
        }
    }

    pub fn validation_for(provider: &'static str, report: ValidationReport) -> Self {
        ProviderError::Validation {
            provider: Some(provider),
            report,
        }
    }

    pub fn authentication(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Authentication {
            provider,
            message: message.into(),
        }
    }

    pub fn api(
        provider: &'static str,
        status: impl Into<Option<u16>>,
        message: impl Into<String>,
        retry_possible: bool,
    ) -> Self {
        ProviderError::Api {
            provider,
            status: status.into(),
            message: message.into(),
            retry_possible,
            severity: ErrorSeverity::Error,
        }
    }

    pub fn rate_limit(provider: &'static str, retry_after: Option<u64>) -> Self {
        ProviderError::RateLimit {
            provider,
            message: match retry_after {
                Some(seconds) => format!("rate limit exceeded, retry after {seconds}s"),
                None => "rate limit exceeded".to_string(),
            },
            retry_after,
        }
    }

    pub fn server(provider: &'static str, status: u16, message: impl Into<String>) -> Self {
        ProviderError::Server {
            provider,
            status,
            message: message.into(),
        }
    }

    pub fn timeout(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Timeout {
            provider,
            message: message.into(),
        }
    }

    pub fn stream_error(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Stream {
            provider,
            message: message.into(),
        }
    }

    /// Fast-fail emitted while a circuit breaker is open; never retryable.
    pub fn circuit_open(provider: &'static str) -> Self {
        ProviderError::Api {
            provider,
            status: None,
            message: "circuit open, request blocked".to_string(),
            retry_possible: false,
            severity: ErrorSeverity::Warning,
        }
    }

    pub fn all_failed(group: impl Into<String>, attempts: Vec<ProviderAttempt>) -> Self {
        ProviderError::AllProvidersFailed {
            group: group.into(),
            attempts,
        }
    }

    pub fn no_providers(group: impl Into<String>) -> Self {
        ProviderError::NoProvidersAvailable {
            group: group.into(),
        }
    }

    /// Whether this error itself hints that a retry may succeed.
    pub fn retry_possible(&self) -> bool {
        match self {
            ProviderError::RateLimit { .. } | ProviderError::Timeout { .. } => true,
            ProviderError::Server { status, .. } => {
                matches!(status, 500 | 502 | 503 | 504)
            }
            ProviderError::Api { retry_possible, .. } => *retry_possible,
            _ => false,
        }
    }

    /// HTTP status attached to the error, when the backend reported one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => *status,
            ProviderError::RateLimit { .. } => Some(429),
            ProviderError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ProviderError::Api { severity, .. } => *severity,
            ProviderError::Authentication { .. } | ProviderError::AllProvidersFailed { .. } => {
                ErrorSeverity::Critical
            }
            ProviderError::RateLimit { .. } | ProviderError::Timeout { .. } => {
                ErrorSeverity::Warning
            }
            _ => ErrorSeverity::Error,
        }
    }

    /// Name of the provider that produced the error, when one did.
    pub fn provider(&self) -> Option<&str> {
        match self {
            ProviderError::Validation { provider, .. } => *provider,
            ProviderError::Authentication { provider, .. }
            | ProviderError::Api { provider, .. }
            | ProviderError::RateLimit { provider, .. }
            | ProviderError::Server { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::Stream { provider, .. } => Some(provider),
            ProviderError::AllProvidersFailed { .. }
            | ProviderError::NoProvidersAvailable { .. } => None,
        }
    }
}

impl From<ValidationReport> for ProviderError {
    fn from(report: ValidationReport) -> Self {
        ProviderError::validation(report)
    }
}
