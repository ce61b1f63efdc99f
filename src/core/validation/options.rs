//! Provider-options validation
//!
//! Each backend recognizes an enumerated option set; unknown keys are
//! rejected. Cross-field rules: OpenAI may carry `functions` or `tools`
//! but not both; Ollama rejects `functions` entirely and requires an
//! http(s) `api_endpoint`.

use serde_json::{Map, Value};
use url::Url;

use super::ValidationReport;

const COMMON_OPTIONS: &[&str] = &[
    "temperature",
    "max_tokens",
    "top_p",
    "stop_sequences",
    "response_format",
    "capabilities",
];

const ANTHROPIC_OPTIONS: &[&str] = &["system"];

const OPENAI_OPTIONS: &[&str] = &[
    "frequency_penalty",
    "presence_penalty",
    "functions",
    "tools",
    "organization",
];

const OLLAMA_OPTIONS: &[&str] = &[
    "repeat_penalty",
    "mirostat",
    "api_endpoint",
    "connect_timeout",
    "request_timeout",
];

fn allowed_options(provider: &str) -> Option<&'static [&'static str]> {
    match provider {
        "anthropic" => Some(ANTHROPIC_OPTIONS),
        "openai" => Some(OPENAI_OPTIONS),
        "ollama" => Some(OLLAMA_OPTIONS),
        _ => None,
    }
}

/// Validate an options map against one backend's recognized surface.
pub fn validate_provider_options(
    provider: &str,
    options: &Map<String, Value>,
) -> Result<(), ValidationReport> {
    let mut report = ValidationReport::new();

    let provider = provider.to_ascii_lowercase();
    let Some(specific) = allowed_options(&provider) else {
        report.push("provider", format!("unknown provider '{provider}'"));
        return report.into_result();
    };

    for (key, value) in options {
        if !COMMON_OPTIONS.contains(&key.as_str()) && !specific.contains(&key.as_str()) {
            if provider == "ollama" && key == "functions" {
                report.push(key, "not supported by the ollama backend");
            } else {
                report.push(key, format!("unrecognized option for provider '{provider}'"));
            }
            continue;
        }
        check_option_value(&mut report, key, value);
    }

    if provider == "openai" && options.contains_key("functions") && options.contains_key("tools") {
        report.push("functions", "mutually exclusive with 'tools'");
    }

    report.into_result()
}

fn check_option_value(report: &mut ValidationReport, key: &str, value: &Value) {
    match key {
        "temperature" | "top_p" => {
            match value.as_f64() {
                Some(v) if (0.0..=1.0).contains(&v) => {}
                Some(v) => report.push(key, format!("must be between 0 and 1, got {v}")),
                None => report.push(key, "must be a number"),
            }
        }
        "max_tokens" => match value.as_u64() {
            Some(v) if v > 0 => {}
            Some(_) => report.push(key, "must be greater than zero"),
            None => report.push(key, "must be a positive integer"),
        },
        "stop_sequences" => {
            if !value.is_array() {
                report.push(key, "must be an array of strings");
            }
        }
        "frequency_penalty" | "presence_penalty" | "repeat_penalty" => {
            if value.as_f64().is_none() {
                report.push(key, "must be a number");
            }
        }
        "mirostat" => {
            if value.as_u64().is_none() {
                report.push(key, "must be a non-negative integer");
            }
        }
        "connect_timeout" | "request_timeout" => match value.as_f64() {
            Some(v) if v > 0.0 => {}
            Some(_) => report.push(key, "must be greater than zero"),
            None => report.push(key, "must be a number of seconds"),
        },
        "api_endpoint" => check_api_endpoint(report, key, value),
        "capabilities" => {
            if !value.is_object() {
                report.push(key, "must be a map of capability name to strength");
            }
        }
        // system, response_format, functions, tools, organization pass through
        _ => {}
    }
}

fn check_api_endpoint(report: &mut ValidationReport, key: &str, value: &Value) {
    let Some(endpoint) = value.as_str() else {
        report.push(key, "must be a string");
        return;
    };
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        report.push(key, "must start with http:// or https://");
        return;
    }
    if Url::parse(endpoint).is_err() {
        report.push(key, format!("not a valid URL: {endpoint}"));
    }
}
