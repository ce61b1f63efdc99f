//! Message model: roles, content parts, and conversation messages
//!
//! Messages use a canonical JSON projection: a single text body serializes
//! as a bare string, mixed content as an array of tagged objects.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::validation::{Validate, ValidationReport};

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Function,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Function => "function",
            MessageRole::Tool => "tool",
        }
    }

    /// Roles that must carry a `name` on their messages.
    pub fn requires_name(&self) -> bool {
        matches!(self, MessageRole::Function | MessageRole::Tool)
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested detail level for image content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    #[default]
    Auto,
    High,
    Low,
}

/// Image reference inside an `image_url` content part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    pub url: String,
    #[serde(default)]
    pub detail: ImageDetail,
}

/// One tagged content part of a message
///
/// Extensible: new tags become new variants with their own payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    ImageUrl { image_url: ImageSource },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    pub fn image_url(
        url: impl Into<String>,
        detail: ImageDetail,
    ) -> Result<Self, ValidationReport> {
        let content = Self::image_url_unchecked(url, detail);
        content.validate()?;
        Ok(content)
    }

    pub(crate) fn image_url_unchecked(url: impl Into<String>, detail: ImageDetail) -> Self {
        MessageContent::ImageUrl {
            image_url: ImageSource {
                url: url.into(),
                detail,
            },
        }
    }

    /// Text carried by this part, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(text),
            MessageContent::ImageUrl { .. } => None,
        }
    }
}

/// Body of a message: a bare string, one content part, or an ordered
/// sequence of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Part(MessageContent),
    Parts(Vec<MessageContent>),
}

impl Content {
    /// Concatenated text of every text part, ignoring non-text parts.
    pub fn flattened_text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Part(part) => part.as_text().unwrap_or_default().to_string(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(MessageContent::as_text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.is_empty(),
            Content::Part(_) => false,
            Content::Parts(parts) => parts.is_empty(),
        }
    }

    /// Collapse redundant representations: a lone text part becomes the
    /// bare-string form, so the JSON projection stays canonical.
    fn canonicalize(self) -> Self {
        match self {
            Content::Part(MessageContent::Text { text }) => Content::Text(text),
            Content::Parts(parts) if parts.len() == 1 => {
                match parts.into_iter().next().expect("len checked") {
                    MessageContent::Text { text } => Content::Text(text),
                    part => Content::Part(part),
                }
            }
            other => other,
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<MessageContent> for Content {
    fn from(part: MessageContent) -> Self {
        Content::Part(part).canonicalize()
    }
}

impl From<Vec<MessageContent>> for Content {
    fn from(parts: Vec<MessageContent>) -> Self {
        Content::Parts(parts).canonicalize()
    }
}

/// One message of a model conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: MessageRole,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ModelMessage {
    /// Build a message with full validation of the role/name contract.
    pub fn new(
        role: MessageRole,
        content: impl Into<Content>,
        name: Option<String>,
    ) -> Result<Self, ValidationReport> {
        let message = Self::new_unchecked(role, content, name);
        message.validate()?;
        Ok(message)
    }

    pub(crate) fn new_unchecked(
        role: MessageRole,
        content: impl Into<Content>,
        name: Option<String>,
    ) -> Self {
        ModelMessage {
            role,
            content: content.into(),
            name,
        }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self::new_unchecked(MessageRole::System, content, None)
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::new_unchecked(MessageRole::User, content, None)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new_unchecked(MessageRole::Assistant, content, None)
    }

    pub fn function(
        content: impl Into<Content>,
        name: impl Into<String>,
    ) -> Result<Self, ValidationReport> {
        Self::new(MessageRole::Function, content, Some(name.into()))
    }

    pub fn tool(
        content: impl Into<Content>,
        name: impl Into<String>,
    ) -> Result<Self, ValidationReport> {
        Self::new(MessageRole::Tool, content, Some(name.into()))
    }

    /// Canonical JSON projection of this message.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("message serialization is infallible")
    }

    /// Rebuild a message from its canonical JSON projection.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ValidationReport> {
        let message: ModelMessage = serde_json::from_value(value).map_err(|e| {
            ValidationReport::with_issue("message", format!("malformed message: {e}"))
        })?;
        message.validate()?;
        Ok(message)
    }
}
