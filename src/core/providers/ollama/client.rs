//! HTTP plumbing for the Ollama generate API

use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde_json::Value;

use super::NAME;
use super::config::OllamaConfig;
use crate::core::providers::error::ProviderError;

#[derive(Debug, Clone)]
pub(crate) struct OllamaClient {
    config: OllamaConfig,
    http: Client,
}

impl OllamaClient {
    pub(crate) fn new(config: OllamaConfig) -> Result<Self, ProviderError> {
        let http = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ProviderError::api(NAME, None, format!("failed to build HTTP client: {e}"), false)
            })?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_endpoint.trim_end_matches('/'))
    }

    /// POST {endpoint}/generate and parse the JSON body.
    pub(crate) async fn generate(&self, body: &Value) -> Result<Value, ProviderError> {
        let response = self.post_generate(body).await?;
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

    /// POST {endpoint}/generate with `stream: true`, returning the open
    /// line-delimited response.
    pub(crate) async fn open_generate_stream(
        &self,
        body: &Value,
    ) -> Result<Response, ProviderError> {
        let response = self.post_generate(body).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &text));
        }
        Ok(response)
    }

    /// GET {endpoint}/version; used as the server liveness probe.
    pub(crate) async fn version(&self) -> Result<Value, ProviderError> {
        self.get_json("version").await
    }

    /// GET {endpoint}/tags; the installed-model listing.
    pub(crate) async fn tags(&self) -> Result<Value, ProviderError> {
        self.get_json("tags").await
    }

    async fn get_json(&self, path: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|e| map_transport_error(&self.config, e))?;

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

    async fn post_generate(&self, body: &Value) -> Result<Response, ProviderError> {
        self.http
            .post(self.endpoint("generate"))
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(&self.config, e))
    }
}

fn map_transport_error(config: &OllamaConfig, error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::timeout(
            NAME,
            format!("timed out talking to {}: {error}", config.api_endpoint),
        )
    } else if error.is_connect() {
        ProviderError::api(
            NAME,
            None,
            format!("failed to connect to {}: {error}", config.api_endpoint),
            true,
        )
    } else {
        ProviderError::api(NAME, None, format!("transport error: {error}"), false)
    }
}

pub(crate) fn map_http_error(status: StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        429 => ProviderError::rate_limit(NAME, None),
        code @ (500 | 502 | 503 | 504) => ProviderError::server(NAME, code, body.to_string()),
        code => ProviderError::api(NAME, code, body.to_string(), false),
    }
}
