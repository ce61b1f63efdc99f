//! Wire-level streaming scenarios against a mock backend

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atlas_gateway::{
    AnthropicConfig, AnthropicProvider, ModelMessage, ModelProvider, ModelRequest, OllamaConfig,
    OllamaProvider, StreamState,
};

fn request(prompt: &str) -> ModelRequest {
    ModelRequest::builder()
        .message(ModelMessage::user(prompt))
        .build()
        .unwrap()
}

#[tokio::test]
async fn ollama_stream_finalizes_without_reported_usage() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"response\":\"hel\"}\n",
        "{\"response\":\"lo\"}\n",
        "{\"done\":true}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes(), "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let config = OllamaConfig::default()
        .with_endpoint(format!("{}/api", server.uri()))
        .unwrap();
    let provider = OllamaProvider::new(config).unwrap();

    let (initial, handler) = provider.stream(&request("say hello")).await.unwrap();
    assert_eq!(initial.content, "");

    let mut chunks = Vec::new();
    let finished = handler
        .process_stream(|chunk, _| chunks.push(chunk.to_string()))
        .await
        .unwrap();

    assert_eq!(chunks, vec!["hel", "lo"]);
    assert_eq!(finished.content, "hello");
    // five characters estimated at four characters per token
    assert_eq!(finished.usage.output_tokens, 1);
    assert_eq!(finished.cost.total_cost, 0.0);
    assert_eq!(finished.finish_reason.as_deref(), Some("stop"));
    assert_eq!(handler.state(), StreamState::Completed);
}

#[tokio::test]
async fn ollama_stream_uses_reported_counts_when_present() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"response\":\"answer\"}\n",
        "{\"done\":true,\"prompt_eval_count\":8,\"eval_count\":21}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes(), "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let config = OllamaConfig::default()
        .with_endpoint(format!("{}/api", server.uri()))
        .unwrap();
    let provider = OllamaProvider::new(config).unwrap();

    let (_, handler) = provider.stream(&request("question")).await.unwrap();
    let finished = handler.process_stream(|_, _| {}).await.unwrap();

    assert_eq!(finished.usage.input_tokens, 8);
    assert_eq!(finished.usage.output_tokens, 21);
    assert_eq!(finished.usage.total_tokens, 29);
    let raw = finished.raw_response.unwrap();
    assert_eq!(raw["eval_count"], 21);
}

#[tokio::test]
async fn anthropic_stream_assembles_sse_frames() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":9}}}\n",
        "\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n",
        "\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n",
        "\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":5}}\n",
        "\n",
        "data: {\"type\":\"message_stop\"}\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.as_bytes(), "text/event-stream"))
        .mount(&server)
        .await;

    let config = AnthropicConfig::new("test-key").with_base_url(server.uri());
    let provider = AnthropicProvider::new(config).unwrap();

    let (_, handler) = provider.stream(&request("greet me")).await.unwrap();
    let finished = handler.process_stream(|_, _| {}).await.unwrap();

    assert_eq!(finished.content, "Hello");
    assert_eq!(finished.usage.input_tokens, 9);
    assert_eq!(finished.usage.output_tokens, 5);
    assert_eq!(finished.finish_reason.as_deref(), Some("end_turn"));
    assert!(finished.cost.total_cost > 0.0);
}

#[tokio::test]
async fn anthropic_generate_ships_system_at_top_level() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "claude-3-7-sonnet-20250219",
            "content": [{"type": "text", "text": "done"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 1},
        })))
        .mount(&server)
        .await;

    let config = AnthropicConfig::new("test-key").with_base_url(server.uri());
    let provider = AnthropicProvider::new(config).unwrap();

    let request = ModelRequest::builder()
        .message(ModelMessage::system("S"))
        .message(ModelMessage::user("U1"))
        .message(ModelMessage::assistant("A1"))
        .message(ModelMessage::user("U2"))
        .build()
        .unwrap();
    let response = provider.generate(&request).await.unwrap();
    assert_eq!(response.content, "done");

    let sent = &server.received_requests().await.unwrap()[0];
    let body: serde_json::Value = serde_json::from_slice(&sent.body).unwrap();
    assert_eq!(body["system"], "S");
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m["role"] != "system"));
}

#[tokio::test]
async fn stream_cancel_tears_down_promptly() {
    let server = MockServer::start().await;
    // endless-looking stream: plenty of chunks, no done marker
    let mut body = String::new();
    for _ in 0..64 {
        body.push_str("{\"response\":\"x\"}\n");
    }
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body.into_bytes(), "application/x-ndjson")
                .set_delay(std::time::Duration::from_millis(50)),
        )
        .mount(&server)
        .await;

    let config = OllamaConfig::default()
        .with_endpoint(format!("{}/api", server.uri()))
        .unwrap();
    let provider = OllamaProvider::new(config).unwrap();

    let (_, handler) = provider.stream(&request("go")).await.unwrap();
    handler.cancel().await;
    assert_eq!(handler.state(), StreamState::Cancelled);
}
