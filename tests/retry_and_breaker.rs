//! Wire-level reliability scenarios against a mock backend

use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atlas_gateway::{
    CircuitBreakerConfig, ModelMessage, ModelProvider, ModelRequest, OpenAIConfig, OpenAIProvider,
    ProviderError, RetryPolicy,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn chat_request() -> ModelRequest {
    ModelRequest::builder()
        .message(ModelMessage::user("hello"))
        .build()
        .unwrap()
}

fn success_body() -> serde_json::Value {
    json!({
        "model": "gpt-4.1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "ok"},
            "finish_reason": "stop",
        }],
        "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2},
    })
}

#[tokio::test]
async fn retry_on_rate_limit_backs_off_and_recovers() {
    init_tracing();
    let server = MockServer::start().await;

    // two 429s, then success
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": {}})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .mount(&server)
        .await;

    let config = OpenAIConfig::new("test-key")
        .with_base_url(server.uri())
        .with_retry(RetryPolicy {
            max_retries: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: 0.0,
            ..RetryPolicy::default()
        });
    let provider = OpenAIProvider::new(config).unwrap();

    let started = Instant::now();
    let response = provider.generate(&chat_request()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(response.content, "ok");
    // delays: 0.5 s after the first 429, 1.0 s after the second
    assert!(elapsed >= Duration::from_millis(1500), "elapsed {elapsed:?}");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn non_retryable_status_fails_on_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;

    let config = OpenAIConfig::new("test-key").with_base_url(server.uri());
    let provider = OpenAIProvider::new(config).unwrap();

    let error = provider.generate(&chat_request()).await.unwrap_err();
    assert_eq!(error.status_code(), Some(400));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn circuit_opens_after_threshold_and_blocks_without_io() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let config = OpenAIConfig::new("test-key")
        .with_base_url(server.uri())
        .with_retry(RetryPolicy::disabled())
        .with_breaker(CircuitBreakerConfig {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            test_requests: 1,
        });
    let provider = OpenAIProvider::new(config).unwrap();

    for _ in 0..5 {
        let error = provider.generate(&chat_request()).await.unwrap_err();
        assert!(matches!(error, ProviderError::Server { status: 500, .. }));
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 5);

    // sixth call short-circuits without touching the backend
    let error = provider.generate(&chat_request()).await.unwrap_err();
    assert!(error.to_string().contains("circuit open"));
    assert!(!error.retry_possible());
    assert_eq!(server.received_requests().await.unwrap().len(), 5);
}

#[tokio::test]
async fn auth_failure_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("no"))
        .mount(&server)
        .await;

    let provider =
        OpenAIProvider::new(OpenAIConfig::new("bad-key").with_base_url(server.uri())).unwrap();

    let error = provider.generate(&chat_request()).await.unwrap_err();
    assert!(matches!(error, ProviderError::Authentication { .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
