//! Provider-group fallback and selection scenarios

use std::sync::Arc;
use std::time::Duration;

use atlas_gateway::{
    Capability, CapabilityStrength, MockProvider, ModelMessage, ModelProvider, ModelRequest,
    ProviderError, ProviderGroup, RetryPolicy, SelectionStrategy,
};

fn request(prompt: &str) -> ModelRequest {
    ModelRequest::builder()
        .message(ModelMessage::user(prompt))
        .build()
        .unwrap()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        min_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        jitter: 0.0,
        ..RetryPolicy::default()
    }
}

#[tokio::test]
async fn failover_skips_to_first_working_provider() {
    let a = Arc::new(
        MockProvider::new("model-a")
            .with_name("alpha")
            .always_failing(ProviderError::timeout("mock", "unreachable")),
    );
    let b = Arc::new(MockProvider::new("model-b").with_name("beta").with_reply("from b"));
    let c = Arc::new(MockProvider::new("model-c").with_name("gamma"));

    let group = ProviderGroup::new(
        vec![a.clone(), b.clone(), c.clone()],
        SelectionStrategy::Failover,
    )
    .unwrap()
    .with_retry_policy(fast_policy());

    let response = group.generate(&request("hi")).await.unwrap();
    assert_eq!(response.content, "from b");
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 1);
    // the third provider is never consulted
    assert_eq!(c.calls(), 0);

    // repeated failures mark the first provider unhealthy
    let _ = group.generate(&request("hi")).await;
    let _ = group.generate(&request("hi")).await;
    let health = group.health();
    assert!(!health[0].healthy);
    assert!(health[1].healthy);
}

#[tokio::test]
async fn task_aware_group_dispatches_to_strongest_reasoner() {
    let fast = Arc::new(
        MockProvider::new("fast-model")
            .with_name("fast")
            .with_capability(Capability::Reasoning, CapabilityStrength::Basic)
            .with_reply("fast answer"),
    );
    let smart = Arc::new(
        MockProvider::new("smart-model")
            .with_name("smart")
            .with_capability(Capability::Reasoning, CapabilityStrength::Strong)
            .with_reply("smart answer"),
    );

    let group = ProviderGroup::new(
        vec![fast.clone(), smart.clone()],
        SelectionStrategy::TaskAware,
    )
    .unwrap()
    .with_retry_policy(fast_policy());

    let response = group
        .generate(&request("Prove that √2 is irrational."))
        .await
        .unwrap();

    assert_eq!(response.content, "smart answer");
    assert_eq!(smart.calls(), 1);
    assert_eq!(fast.calls(), 0);
}

#[tokio::test]
async fn exhausted_group_reports_every_attempt() {
    let a = Arc::new(
        MockProvider::new("m")
            .with_name("first")
            .always_failing(ProviderError::timeout("mock", "no route")),
    );
    let b = Arc::new(
        MockProvider::new("m")
            .with_name("second")
            .always_failing(ProviderError::server("mock", 503, "overloaded")),
    );

    let group = ProviderGroup::new(vec![a as Arc<dyn ModelProvider>, b as Arc<dyn ModelProvider>], SelectionStrategy::Failover)
        .unwrap()
        .with_name("edge-group")
        .with_retry_policy(fast_policy());

    let error = group.generate(&request("hi")).await.unwrap_err();
    match &error {
        ProviderError::AllProvidersFailed { group, attempts } => {
            assert_eq!(group, "edge-group");
            assert_eq!(attempts.len(), 2);
            assert_eq!(attempts[0].provider, "first");
            assert_eq!(attempts[1].provider, "second");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let rendered = error.to_string();
    assert!(rendered.contains("no route"));
    assert!(rendered.contains("overloaded"));
}

#[tokio::test]
async fn round_robin_spreads_load() {
    let a = Arc::new(MockProvider::new("m").with_name("a"));
    let b = Arc::new(MockProvider::new("m").with_name("b"));

    let group = ProviderGroup::new(vec![a.clone(), b.clone()], SelectionStrategy::RoundRobin)
        .unwrap()
        .with_retry_policy(fast_policy());

    for _ in 0..4 {
        group.generate(&request("hi")).await.unwrap();
    }
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 2);
}

#[tokio::test]
async fn streamed_fallback_returns_working_handler() {
    let broken = Arc::new(
        MockProvider::new("m")
            .with_name("broken")
            .always_failing(ProviderError::server("mock", 502, "bad gateway")),
    );
    let working = Arc::new(MockProvider::new("m").with_name("working").with_reply("streamed text"));

    let group = ProviderGroup::new(vec![broken, working], SelectionStrategy::Failover)
        .unwrap()
        .with_retry_policy(fast_policy());

    let (_, handler) = group.stream(&request("hi")).await.unwrap();
    let finished = handler.process_stream(|_, _| {}).await.unwrap();
    assert_eq!(finished.content, "streamed text");
}
