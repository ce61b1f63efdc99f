//! SSE decoding for OpenAI chat completion streams
//!
//! Frames arrive as `data: {json}` lines; content rides in
//! `choices[0].delta.content`, completion is signalled by a non-null
//! `choices[0].finish_reason`, usage may appear on a terminal frame, and
//! `data: [DONE]` closes the stream.

use serde_json::Value;

use crate::core::providers::error::ProviderError;
use crate::core::streaming::handler::{ChunkDecoder, StreamEvent};

use super::NAME;

#[derive(Debug, Default)]
pub(crate) struct OpenAIChunkDecoder;

impl ChunkDecoder for OpenAIChunkDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Option<StreamEvent>, ProviderError> {
        if line.starts_with(':') {
            return Ok(None);
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();
        if data.is_empty() {
            return Ok(None);
        }
        if data == "[DONE]" {
            return Ok(Some(StreamEvent::done()));
        }

        let frame: Value = serde_json::from_str(data).map_err(|e| {
            ProviderError::stream_error(NAME, format!("malformed stream frame: {e}"))
        })?;

        if let Some(message) = frame.pointer("/error/message").and_then(Value::as_str) {
            let mut event = StreamEvent::default();
            event.error = Some(message.to_string());
            return Ok(Some(event));
        }

        let mut event = StreamEvent::default();
        event.delta = frame
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .map(str::to_string);
        event.finish_reason = frame
            .pointer("/choices/0/finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string);
        event.input_tokens = frame
            .pointer("/usage/prompt_tokens")
            .and_then(Value::as_u64);
        event.output_tokens = frame
            .pointer("/usage/completion_tokens")
            .and_then(Value::as_u64);
        if let Some(id) = frame.get("id").and_then(Value::as_str) {
            event.metadata.push(("id".to_string(), Value::from(id)));
        }

        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> Option<StreamEvent> {
        OpenAIChunkDecoder.decode_line(line).unwrap()
    }

    #[test]
    fn test_content_delta() {
        let event = decode(
            r#"data: {"id":"cc-1","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(event.delta.as_deref(), Some("Hi"));
        assert!(event.finish_reason.is_none());
        assert!(!event.done);
    }

    #[test]
    fn test_finish_reason_captured_without_closing() {
        let event = decode(
            r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(event.finish_reason.as_deref(), Some("stop"));
        assert!(!event.done);
    }

    #[test]
    fn test_done_marker_closes() {
        let event = decode("data: [DONE]").unwrap();
        assert!(event.done);
    }

    #[test]
    fn test_usage_on_terminal_frame() {
        let event = decode(
            r#"data: {"choices":[],"usage":{"prompt_tokens":11,"completion_tokens":3}}"#,
        )
        .unwrap();
        assert_eq!(event.input_tokens, Some(11));
        assert_eq!(event.output_tokens, Some(3));
    }

    #[test]
    fn test_error_frame() {
        let event = decode(r#"data: {"error":{"message":"server busy"}}"#).unwrap();
        assert_eq!(event.error.as_deref(), Some("server busy"));
    }
}
