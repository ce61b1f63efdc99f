//! HTTP plumbing for the Anthropic messages API

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde_json::Value;

use super::NAME;
use super::config::AnthropicConfig;
use crate::core::providers::error::ProviderError;

#[derive(Debug, Clone)]
pub(crate) struct AnthropicClient {
    config: AnthropicConfig,
    http: Client,
}

impl AnthropicClient {
    pub(crate) fn new(config: AnthropicConfig) -> Result<Self, ProviderError> {
        let http = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ProviderError::api(NAME, None, format!("failed to build HTTP client: {e}"), false)
            })?;
        Ok(Self { config, http })
    }

    /// POST /v1/messages and parse the JSON body.
    pub(crate) async fn send_messages(&self, body: &Value) -> Result<Value, ProviderError> {
        let response = self.post_messages(body).await?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::api(NAME, None, format!("failed to read response: {e}"), true))?;

        if !status.is_success() {
            return Err(map_http_error(status, &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| ProviderError::api(NAME, None, format!("malformed response body: {e}"), false))
    }

    /// POST /v1/messages with `stream: true`, returning the open response.
    pub(crate) async fn open_message_stream(
        &self,
        body: &Value,
    ) -> Result<Response, ProviderError> {
        let response = self.post_messages(body).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &text));
        }
        Ok(response)
    }

    async fn post_messages(&self, body: &Value) -> Result<Response, ProviderError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        self.http
            .post(&url)
            .headers(self.build_headers())
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.config.api_key {
            if let Ok(value) = HeaderValue::from_str(api_key) {
                headers.insert("x-api-key", value);
            }
        }
        if let Ok(value) = HeaderValue::from_str(&self.config.api_version) {
            headers.insert("anthropic-version", value);
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers
    }
}

pub(crate) fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::timeout(NAME, format!("request timed out: {error}"))
    } else if error.is_connect() {
        ProviderError::api(NAME, None, format!("connection failed: {error}"), true)
    } else {
        ProviderError::api(NAME, None, format!("transport error: {error}"), false)
    }
}

pub(crate) fn map_http_error(status: StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::authentication(NAME, "invalid or missing API key"),
        429 => ProviderError::rate_limit(NAME, extract_retry_after(body)),
        code @ (500 | 502 | 503 | 504) => ProviderError::server(NAME, code, truncate(body)),
        code @ 500..=599 => ProviderError::api(NAME, code, truncate(body), false),
        code => ProviderError::api(NAME, code, truncate(body), false),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("retry_after")
        .or_else(|| value.get("error")?.get("retry_after"))
        .and_then(Value::as_u64)
}

fn truncate(body: &str) -> String {
    const LIMIT: usize = 512;
    if body.len() > LIMIT {
        let head: String = body.chars().take(LIMIT).collect();
        format!("{head}…")
    } else {
        body.to_string()
    }
}
