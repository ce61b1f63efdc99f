//! SSE decoding for Anthropic message streams
//!
//! Frames arrive as `data: {json}` lines tagged with a `type` field:
//! `message_start` carries the input token count, `content_block_delta`
//! carries text fragments, `message_delta` carries the stop reason and
//! output count, `message_stop` ends the stream.

use serde_json::Value;

use crate::core::providers::error::ProviderError;
use crate::core::streaming::handler::{ChunkDecoder, StreamEvent};

use super::NAME;

#[derive(Debug, Default)]
pub(crate) struct AnthropicChunkDecoder;

impl ChunkDecoder for AnthropicChunkDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Option<StreamEvent>, ProviderError> {
        // event-name lines and comments carry no payload
        if line.starts_with("event:") || line.starts_with(':') {
            return Ok(None);
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();
        if data.is_empty() {
            return Ok(None);
        }

        let frame: Value = serde_json::from_str(data).map_err(|e| {
            ProviderError::stream_error(NAME, format!("malformed stream frame: {e}"))
        })?;

        let mut event = StreamEvent::default();
        match frame.get("type").and_then(Value::as_str).unwrap_or("") {
            "message_start" => {
                event.input_tokens = frame
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64);
                if let Some(id) = frame.pointer("/message/id").and_then(Value::as_str) {
                    event.metadata.push(("id".to_string(), Value::from(id)));
                }
            }
            "content_block_delta" => {
                event.delta = frame
                    .pointer("/delta/text")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            "message_delta" => {
                event.output_tokens = frame
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64);
                event.finish_reason = frame
                    .pointer("/delta/stop_reason")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            "message_stop" => {
                event.input_tokens = frame
                    .pointer("/usage/input_tokens")
                    .and_then(Value::as_u64);
                event.output_tokens = frame
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64);
                event.done = true;
            }
            "error" => {
                let message = frame
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("backend-signalled stream error");
                event.error = Some(message.to_string());
            }
            // ping and future frame types
            _ => return Ok(None),
        }

        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> Option<StreamEvent> {
        AnthropicChunkDecoder.decode_line(line).unwrap()
    }

    #[test]
    fn test_event_lines_are_skipped() {
        assert!(decode("event: content_block_delta").is_none());
        assert!(decode(": keep-alive").is_none());
    }

    #[test]
    fn test_text_delta() {
        let event = decode(
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap();
        assert_eq!(event.delta.as_deref(), Some("Hi"));
        assert!(!event.done);
    }

    #[test]
    fn test_message_start_captures_input_tokens() {
        let event = decode(
            r#"data: {"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":9}}}"#,
        )
        .unwrap();
        assert_eq!(event.input_tokens, Some(9));
    }

    #[test]
    fn test_message_delta_captures_stop_reason() {
        let event = decode(
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#,
        )
        .unwrap();
        assert_eq!(event.finish_reason.as_deref(), Some("end_turn"));
        assert_eq!(event.output_tokens, Some(5));
    }

    #[test]
    fn test_message_stop_ends_stream_with_usage() {
        let event = decode(
            r#"data: {"type":"message_stop","usage":{"input_tokens":9,"output_tokens":5}}"#,
        )
        .unwrap();
        assert!(event.done);
        assert_eq!(event.input_tokens, Some(9));
        assert_eq!(event.output_tokens, Some(5));
    }

    #[test]
    fn test_error_frame() {
        let event = decode(
            r#"data: {"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#,
        )
        .unwrap();
        assert_eq!(event.error.as_deref(), Some("busy"));
    }
}
