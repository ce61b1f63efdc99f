//! JSON-lines decoding for Ollama generate streams
//!
//! Each line is one JSON object: `response` carries the content delta,
//! `done: true` ends the stream, and the terminal object reports
//! `prompt_eval_count` / `eval_count`. Everything except the delta is
//! recorded as metadata.

use serde_json::Value;

use crate::core::providers::error::ProviderError;
use crate::core::streaming::handler::{ChunkDecoder, StreamEvent};

use super::NAME;

#[derive(Debug, Default)]
pub(crate) struct OllamaChunkDecoder;

impl ChunkDecoder for OllamaChunkDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Option<StreamEvent>, ProviderError> {
        let frame: Value = serde_json::from_str(line).map_err(|e| {
            ProviderError::stream_error(NAME, format!("malformed stream line: {e}"))
        })?;
        let Value::Object(frame) = frame else {
            return Err(ProviderError::stream_error(NAME, "stream line is not an object"));
        };

        let mut event = StreamEvent::default();
        if let Some(message) = frame.get("error").and_then(Value::as_str) {
            event.error = Some(message.to_string());
            return Ok(Some(event));
        }

        for (key, value) in frame {
            match key.as_str() {
                "response" => {
                    event.delta = value.as_str().map(str::to_string);
                }
                "prompt_eval_count" => {
                    event.input_tokens = value.as_u64();
                    event.metadata.push((key, value));
                }
                "eval_count" => {
                    event.output_tokens = value.as_u64();
                    event.metadata.push((key, value));
                }
                "done" => {
                    event.done = value.as_bool().unwrap_or(false);
                    event.metadata.push((key, value));
                }
                _ => event.metadata.push((key, value)),
            }
        }

        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> StreamEvent {
        OllamaChunkDecoder.decode_line(line).unwrap().unwrap()
    }

    #[test]
    fn test_response_delta() {
        let event = decode(r#"{"model":"llama3","response":"hel","done":false}"#);
        assert_eq!(event.delta.as_deref(), Some("hel"));
        assert!(!event.done);
    }

    #[test]
    fn test_done_without_counts() {
        let event = decode(r#"{"done":true}"#);
        assert!(event.done);
        assert!(event.input_tokens.is_none());
        assert!(event.output_tokens.is_none());
    }

    #[test]
    fn test_terminal_counts() {
        let event = decode(r#"{"done":true,"prompt_eval_count":7,"eval_count":21}"#);
        assert!(event.done);
        assert_eq!(event.input_tokens, Some(7));
        assert_eq!(event.output_tokens, Some(21));
    }

    #[test]
    fn test_metadata_keeps_non_delta_keys() {
        let event = decode(r#"{"model":"llama3","response":"x","total_duration":12345}"#);
        let keys: Vec<&str> = event.metadata.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"model"));
        assert!(keys.contains(&"total_duration"));
        assert!(!keys.contains(&"response"));
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        assert!(OllamaChunkDecoder.decode_line("not json").is_err());
    }
}
