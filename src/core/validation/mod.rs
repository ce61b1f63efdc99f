//! Runtime validation of every record crossing an API boundary
//!
//! Each check produces a [`ValidationIssue`] with a field path and message;
//! a non-empty [`ValidationReport`] fails the construction or call. Most of
//! the membership checks of the original dynamic schema collapse into the
//! type system here; what remains are range checks, additivity invariants,
//! and cross-field rules.

pub mod options;

use std::fmt;

use crate::core::types::message::{Content, MessageContent, ModelMessage};
use crate::core::types::request::ModelRequest;
use crate::core::types::response::{COST_TOLERANCE, CostEstimate, ModelResponse, TokenUsage};

pub use options::validate_provider_options;

/// A single failed check, anchored to the offending field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Aggregated validation failures for one record or options map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issue(path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut report = Self::new();
        report.push(path, message);
        report
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Absorb another report, prefixing its paths.
    pub fn absorb(&mut self, prefix: &str, other: ValidationReport) {
        for issue in other.issues {
            self.issues.push(ValidationIssue {
                path: format!("{prefix}.{}", issue.path),
                message: issue.message,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_result(self) -> Result<(), ValidationReport> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join("; "))
    }
}

impl std::error::Error for ValidationReport {}

/// Records that check themselves before being used
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationReport>;
}

fn check_unit_interval(report: &mut ValidationReport, path: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        report.push(path, format!("must be between 0 and 1, got {value}"));
    }
}

impl Validate for MessageContent {
    fn validate(&self) -> Result<(), ValidationReport> {
        let mut report = ValidationReport::new();
        match self {
            MessageContent::Text { .. } => {}
            MessageContent::ImageUrl { image_url } => {
                if image_url.url.is_empty() {
                    report.push("image_url.url", "must not be empty");
                }
            }
        }
        report.into_result()
    }
}

impl Validate for Content {
    fn validate(&self) -> Result<(), ValidationReport> {
        let mut report = ValidationReport::new();
        match self {
            Content::Text(_) => {}
            Content::Part(part) => {
                if let Err(inner) = part.validate() {
                    report.absorb("content", inner);
                }
            }
            Content::Parts(parts) => {
                for (index, part) in parts.iter().enumerate() {
                    if let Err(inner) = part.validate() {
                        report.absorb(&format!("content[{index}]"), inner);
                    }
                }
            }
        }
        report.into_result()
    }
}

impl Validate for ModelMessage {
    fn validate(&self) -> Result<(), ValidationReport> {
        let mut report = ValidationReport::new();

        if self.role.requires_name() && self.name.as_deref().unwrap_or("").is_empty() {
            report.push("name", format!("required for role '{}'", self.role));
        }
        if let Err(inner) = self.content.validate() {
            report.absorb("message", inner);
        }

        report.into_result()
    }
}

impl Validate for ModelRequest {
    fn validate(&self) -> Result<(), ValidationReport> {
        let mut report = ValidationReport::new();

        if self.messages.is_empty() {
            report.push("messages", "must not be empty");
        }
        for (index, message) in self.messages.iter().enumerate() {
            if let Err(inner) = message.validate() {
                report.absorb(&format!("messages[{index}]"), inner);
            }
        }
        if let Some(temperature) = self.temperature {
            check_unit_interval(&mut report, "temperature", temperature);
        }
        if let Some(top_p) = self.top_p {
            check_unit_interval(&mut report, "top_p", top_p);
        }
        if self.max_tokens == Some(0) {
            report.push("max_tokens", "must be greater than zero");
        }

        report.into_result()
    }
}

impl Validate for TokenUsage {
    fn validate(&self) -> Result<(), ValidationReport> {
        let mut report = ValidationReport::new();
        if self.input_tokens + self.output_tokens != self.total_tokens {
            report.push(
                "total_tokens",
                format!(
                    "must equal input_tokens + output_tokens ({} + {} != {})",
                    self.input_tokens, self.output_tokens, self.total_tokens
                ),
            );
        }
        report.into_result()
    }
}

impl Validate for CostEstimate {
    fn validate(&self) -> Result<(), ValidationReport> {
        let mut report = ValidationReport::new();
        for (path, value) in [
            ("input_cost", self.input_cost),
            ("output_cost", self.output_cost),
            ("total_cost", self.total_cost),
        ] {
            if value < 0.0 {
                report.push(path, format!("must not be negative, got {value}"));
            }
        }
        if (self.input_cost + self.output_cost - self.total_cost).abs() > COST_TOLERANCE {
            report.push(
                "total_cost",
                format!(
                    "must equal input_cost + output_cost ({} + {} != {})",
                    self.input_cost, self.output_cost, self.total_cost
                ),
            );
        }
        report.into_result()
    }
}

impl Validate for ModelResponse {
    fn validate(&self) -> Result<(), ValidationReport> {
        let mut report = ValidationReport::new();

        if self.provider.is_empty() {
            report.push("provider", "must not be empty");
        }
        if self.model.is_empty() {
            report.push("model", "must not be empty");
        }
        if let Err(inner) = self.usage.validate() {
            report.absorb("usage", inner);
        }
        if let Err(inner) = self.cost.validate() {
            report.absorb("cost", inner);
        }

        report.into_result()
    }
}
