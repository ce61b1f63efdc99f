//! Core data model: messages, requests, and responses

pub mod message;
pub mod request;
pub mod response;

pub use message::{Content, ImageDetail, ImageSource, MessageContent, MessageRole, ModelMessage};
pub use request::{ModelRequest, ModelRequestBuilder};
pub use response::{COST_TOLERANCE, CostEstimate, ModelResponse, TokenUsage};
