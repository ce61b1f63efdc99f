//! Backend-agnostic model request and its per-backend wire shapes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::message::{MessageRole, ModelMessage};
use crate::core::validation::{Validate, ValidationReport};

/// A request to any model backend
///
/// Invariant: `messages` is non-empty. When `system_prompt` is set and no
/// message carries the system role, a synthesized system message is
/// prepended at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub messages: Vec<ModelMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ModelRequest {
    /// Validated request from messages alone; everything else defaulted.
    pub fn new(messages: Vec<ModelMessage>) -> Result<Self, ValidationReport> {
        Self::builder().messages(messages).build()
    }

    pub fn builder() -> ModelRequestBuilder {
        ModelRequestBuilder::default()
    }

    /// Concatenated text of every message, used for character-based token
    /// estimation.
    pub fn flattened_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.flattened_text())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Translate into the wire shape a specific backend expects.
    ///
    /// Unrecognized provider names receive the common base shape.
    pub fn to_provider_request(&self, provider_name: &str) -> Value {
        match provider_name.to_ascii_lowercase().as_str() {
            "anthropic" => self.to_anthropic_request(),
            "ollama" => self.to_ollama_request(),
            "openai" => self.to_openai_request(),
            _ => self.base_request(self.messages.iter()),
        }
    }

    fn base_request<'a>(&self, messages: impl Iterator<Item = &'a ModelMessage>) -> Value {
        let mut request = json!({
            "messages": messages.map(ModelMessage::to_value).collect::<Vec<_>>(),
        });

        if let Some(max_tokens) = self.max_tokens {
            request["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            request["temperature"] = json!(temperature);
        }
        if let Some(stop) = &self.stop_sequences {
            request["stop"] = json!(stop);
        }
        if let Some(top_p) = self.top_p {
            request["top_p"] = json!(top_p);
        }
        if let Some(format) = &self.response_format {
            request["response_format"] = format.clone();
        }

        request
    }

    /// Anthropic shape: system messages are extracted, the first one is
    /// emitted as the top-level `system` field, the rest of the dialog
    /// passes through without system turns.
    fn to_anthropic_request(&self) -> Value {
        let mut request =
            self.base_request(self.messages.iter().filter(|m| m.role != MessageRole::System));

        if let Some(system) = self.messages.iter().find(|m| m.role == MessageRole::System) {
            request["system"] = serde_json::to_value(&system.content)
                .expect("content serialization is infallible");
        }

        request
    }

    /// OpenAI shape: messages pass through untouched; penalty parameters
    /// are forwarded on top of the base shape.
    fn to_openai_request(&self) -> Value {
        let mut request = self.base_request(self.messages.iter());

        if let Some(frequency_penalty) = self.frequency_penalty {
            request["frequency_penalty"] = json!(frequency_penalty);
        }
        if let Some(presence_penalty) = self.presence_penalty {
            request["presence_penalty"] = json!(presence_penalty);
        }

        request
    }

    /// Ollama shape: the dialog flattens into a prompt of `User:` /
    /// `Assistant:` blocks with the last assistant turn left open, system
    /// content lifts to the top level, and sampling parameters move under
    /// `options` with `max_tokens` carried as `num_predict`.
    fn to_ollama_request(&self) -> Value {
        let (prompt, system) = self.flatten_dialog();

        let mut options = Map::new();
        if let Some(max_tokens) = self.max_tokens {
            options.insert("num_predict".to_string(), json!(max_tokens));
        }
        if let Some(temperature) = self.temperature {
            options.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = self.top_p {
            options.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(stop) = &self.stop_sequences {
            options.insert("stop".to_string(), json!(stop));
        }

        let mut request = json!({
            "prompt": prompt,
            "options": Value::Object(options),
        });
        if let Some(system) = system {
            request["system"] = json!(system);
        }

        request
    }

    fn flatten_dialog(&self) -> (String, Option<String>) {
        let mut system = None;
        let mut blocks = Vec::new();

        for message in &self.messages {
            let text = message.content.flattened_text();
            match message.role {
                MessageRole::System => {
                    if system.is_none() {
                        system = Some(text);
                    }
                }
                MessageRole::User => blocks.push(format!("User: {text}")),
                MessageRole::Assistant => blocks.push(format!("Assistant: {text}")),
                MessageRole::Function => {
                    let name = message.name.as_deref().unwrap_or("function");
                    blocks.push(format!("Function ({name}): {text}"));
                }
                MessageRole::Tool => {
                    let name = message.name.as_deref().unwrap_or("tool");
                    blocks.push(format!("Tool ({name}): {text}"));
                }
            }
        }

        // Leave the final assistant turn open for the model to complete.
        if blocks.last().is_none_or(|last| !last.starts_with("Assistant:")) {
            blocks.push("Assistant:".to_string());
        }

        (blocks.join("\n\n"), system)
    }
}

/// Builder for [`ModelRequest`]
#[derive(Debug, Clone, Default)]
pub struct ModelRequestBuilder {
    messages: Vec<ModelMessage>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    frequency_penalty: Option<f64>,
    presence_penalty: Option<f64>,
    stop_sequences: Option<Vec<String>>,
    response_format: Option<Value>,
    system_prompt: Option<String>,
    metadata: Map<String, Value>,
}

impl ModelRequestBuilder {
    pub fn message(mut self, message: ModelMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = ModelMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn frequency_penalty(mut self, frequency_penalty: f64) -> Self {
        self.frequency_penalty = Some(frequency_penalty);
        self
    }

    pub fn presence_penalty(mut self, presence_penalty: f64) -> Self {
        self.presence_penalty = Some(presence_penalty);
        self
    }

    pub fn stop_sequences(mut self, stop: impl IntoIterator<Item = String>) -> Self {
        self.stop_sequences = Some(stop.into_iter().collect());
        self
    }

    pub fn response_format(mut self, format: Value) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<ModelRequest, ValidationReport> {
        let mut messages = self.messages;

        // Synthesize a system turn from the prompt when the dialog has none.
        if let Some(system_prompt) = &self.system_prompt {
            if !messages.iter().any(|m| m.role == MessageRole::System) {
                messages.insert(0, ModelMessage::system(system_prompt.clone()));
            }
        }

        let request = ModelRequest {
            messages,
            model: self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            stop_sequences: self.stop_sequences,
            response_format: self.response_format,
            system_prompt: self.system_prompt,
            metadata: self.metadata,
        };
        request.validate()?;
        Ok(request)
    }
}
