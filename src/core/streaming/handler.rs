//! Live handle for one in-flight streaming response
//!
//! The handler owns a background producer task that reads wire chunks,
//! decodes them through a backend-specific [`ChunkDecoder`], and appends
//! content deltas to a FIFO buffer while updating the evolving
//! [`ModelResponse`] in place. The consumer drains the buffer directly or
//! through an async iterator. Buffer append, cumulative content, and
//! metrics move together under one handler-local lock, so chunks reach the
//! consumer in producer order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::state::{StreamMetrics, StreamState};
use crate::core::providers::error::ProviderError;
use crate::core::providers::pricing::PriceTable;
use crate::core::types::response::{ModelResponse, TokenUsage};

/// Producer join budget on cancel/close.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Consumer poll interval while the buffer is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Decoded effect of one wire line
#[derive(Debug, Default)]
pub struct StreamEvent {
    /// Content fragment to append
    pub delta: Option<String>,
    /// Reported input token count
    pub input_tokens: Option<u64>,
    /// Reported output token count
    pub output_tokens: Option<u64>,
    /// Reported stop reason
    pub finish_reason: Option<String>,
    /// Incidental metadata to record into the final raw response
    pub metadata: Vec<(String, Value)>,
    /// Backend-signalled stream error
    pub error: Option<String>,
    /// End-of-stream marker
    pub done: bool,
}

impl StreamEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        StreamEvent {
            delta: Some(text.into()),
            ..StreamEvent::default()
        }
    }

    pub fn done() -> Self {
        StreamEvent {
            done: true,
            ..StreamEvent::default()
        }
    }
}

/// Backend-specific decoding of wire lines into stream events
pub trait ChunkDecoder: Send + 'static {
    /// Decode one line of the wire stream. `None` means the line carries
    /// nothing of interest (heartbeat, comment, event label).
    fn decode_line(&mut self, line: &str) -> Result<Option<StreamEvent>, ProviderError>;
}

struct StreamBody {
    state: StreamState,
    buffer: VecDeque<String>,
    response: ModelResponse,
    metrics: StreamMetrics,
    metadata: Map<String, Value>,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    finish_reason: Option<String>,
    error: Option<ProviderError>,
}

struct HandlerShared {
    id: String,
    provider: &'static str,
    model: String,
    pricing: PriceTable,
    body: Mutex<StreamBody>,
}

impl HandlerShared {
    fn state(&self) -> StreamState {
        self.body.lock().state
    }

    /// Fold one decoded event into the stream. Returns true once the
    /// stream has reached a terminal state.
    fn apply_event(&self, event: StreamEvent) -> bool {
        let mut body = self.body.lock();
        if body.state.is_terminal() {
            return true;
        }

        if let Some(message) = event.error {
            body.state = StreamState::Error;
            body.error = Some(ProviderError::stream_error(self.provider, message));
            body.metrics.finished_at = Some(Instant::now());
            return true;
        }

        if let Some(delta) = event.delta {
            if !delta.is_empty() {
                body.response.content.push_str(&delta);
                body.buffer.push_back(delta);
                body.metrics.chunk_count += 1;
                body.metrics.estimated_tokens = (body.response.content.chars().count() / 4) as u64;
            }
        }
        if event.input_tokens.is_some() {
            body.input_tokens = event.input_tokens;
        }
        if event.output_tokens.is_some() {
            body.output_tokens = event.output_tokens;
        }
        if event.finish_reason.is_some() {
            body.finish_reason = event.finish_reason;
        }
        for (key, value) in event.metadata {
            body.metadata.insert(key, value);
        }

        if event.done {
            self.finalize(&mut body);
            return true;
        }
        false
    }

    /// Derive final usage, cost, and finish reason; runs once, right
    /// before the terminal signal.
    fn finalize(&self, body: &mut StreamBody) {
        let input = body.input_tokens.unwrap_or(0);
        let output = body
            .output_tokens
            .unwrap_or_else(|| (body.response.content.chars().count() / 4) as u64);

        body.response.usage = TokenUsage::from_counts(input, output);
        body.response.cost = self.pricing.cost(&body.response.usage, &self.model);
        body.response.finish_reason =
            Some(body.finish_reason.clone().unwrap_or_else(|| "stop".to_string()));
        if !body.metadata.is_empty() {
            body.response.raw_response = Some(Value::Object(body.metadata.clone()));
        }
        body.metrics.finished_at = Some(Instant::now());
        body.state = StreamState::Completed;
        debug!(
            stream = %self.id,
            provider = self.provider,
            chunks = body.metrics.chunk_count,
            "stream completed"
        );
    }

    fn finalize_if_running(&self) {
        let mut body = self.body.lock();
        if matches!(body.state, StreamState::Active | StreamState::Paused) {
            self.finalize(&mut body);
        }
    }

    fn fail(&self, error: ProviderError) {
        let mut body = self.body.lock();
        if !body.state.is_terminal() {
            warn!(stream = %self.id, provider = self.provider, %error, "stream failed");
            body.state = StreamState::Error;
            body.error = Some(error);
            body.metrics.finished_at = Some(Instant::now());
        }
    }
}

enum ProducerSlot {
    Idle(Box<dyn FnOnce() -> JoinHandle<()> + Send>),
    Running(JoinHandle<()>),
    Finished,
}

/// Handle for one streaming request
pub struct StreamHandler {
    shared: Arc<HandlerShared>,
    producer: Mutex<ProducerSlot>,
}

impl StreamHandler {
    /// Build a handler whose producer reads a byte stream (an HTTP
    /// response body) line by line through the given decoder.
    pub(crate) fn from_byte_stream<S, E>(
        provider: &'static str,
        model: impl Into<String>,
        initial_response: ModelResponse,
        pricing: PriceTable,
        source: S,
        decoder: Box<dyn ChunkDecoder>,
    ) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let shared = Arc::new(HandlerShared {
            id: Uuid::new_v4().to_string(),
            provider,
            model: model.into(),
            pricing,
            body: Mutex::new(StreamBody {
                state: StreamState::Initializing,
                buffer: VecDeque::new(),
                response: initial_response,
                metrics: StreamMetrics::default(),
                metadata: Map::new(),
                input_tokens: None,
                output_tokens: None,
                finish_reason: None,
                error: None,
            }),
        });

        let worker = shared.clone();
        let spawn: Box<dyn FnOnce() -> JoinHandle<()> + Send> =
            Box::new(move || tokio::spawn(produce(worker, source, decoder)));

        StreamHandler {
            shared,
            producer: Mutex::new(ProducerSlot::Idle(spawn)),
        }
    }

    /// Build a handler fed from pre-scripted chunks. The producer applies
    /// each chunk with a short delay and then finalizes.
    pub(crate) fn from_script(
        provider: &'static str,
        model: impl Into<String>,
        initial_response: ModelResponse,
        pricing: PriceTable,
        chunks: Vec<String>,
    ) -> Self {
        let lines: Vec<Result<Bytes, std::convert::Infallible>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::from(format!("{}\n", serde_json::json!({ "text": c })))))
            .chain(std::iter::once(Ok(Bytes::from(
                serde_json::json!({ "done": true }).to_string() + "\n",
            ))))
            .collect();

        Self::from_byte_stream(
            provider,
            model,
            initial_response,
            pricing,
            futures::stream::iter(lines),
            Box::new(ScriptDecoder),
        )
    }

    /// Start the producer. Idempotent: later calls are no-ops.
    pub fn start(&self) {
        let mut slot = self.producer.lock();
        if matches!(&*slot, ProducerSlot::Idle(_)) {
            {
                let mut body = self.shared.body.lock();
                if body.state == StreamState::Initializing {
                    body.state = StreamState::Active;
                    body.metrics.started_at = Some(Instant::now());
                }
            }
            if let ProducerSlot::Idle(spawn) = std::mem::replace(&mut *slot, ProducerSlot::Finished)
            {
                *slot = ProducerSlot::Running(spawn());
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn provider(&self) -> &'static str {
        self.shared.provider
    }

    pub fn model(&self) -> &str {
        &self.shared.model
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn metrics(&self) -> StreamMetrics {
        self.shared.body.lock().metrics
    }

    /// Snapshot of the evolving (or final) response.
    pub fn response(&self) -> ModelResponse {
        self.shared.body.lock().response.clone()
    }

    /// Error observed by the producer, if the stream failed.
    pub fn error(&self) -> Option<ProviderError> {
        self.shared.body.lock().error.clone()
    }

    /// Pop one buffered chunk, if any is waiting.
    pub fn read(&self) -> Option<String> {
        self.shared.body.lock().buffer.pop_front()
    }

    /// Drain every buffered chunk.
    pub fn read_all(&self) -> Vec<String> {
        let mut body = self.shared.body.lock();
        body.buffer.drain(..).collect()
    }

    /// Next chunk, waiting briefly between polls; `None` once the stream
    /// is terminal and the buffer is drained.
    pub async fn next_chunk(&self) -> Option<String> {
        loop {
            {
                let mut body = self.shared.body.lock();
                if let Some(chunk) = body.buffer.pop_front() {
                    return Some(chunk);
                }
                if body.state.is_terminal() {
                    return None;
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Async iterator over chunks in producer order.
    pub fn chunk_stream(&self) -> impl Stream<Item = String> + '_ {
        async_stream::stream! {
            while let Some(chunk) = self.next_chunk().await {
                yield chunk;
            }
        }
    }

    /// Drive the stream to completion, invoking the callback per chunk
    /// with a snapshot of the evolving response. A panicking callback is
    /// logged and does not abort processing.
    pub async fn process_stream<F>(&self, mut callback: F) -> Result<ModelResponse, ProviderError>
    where
        F: FnMut(&str, &ModelResponse),
    {
        self.start();
        while let Some(chunk) = self.next_chunk().await {
            let snapshot = self.response();
            let invoke = std::panic::AssertUnwindSafe(|| callback(&chunk, &snapshot));
            if let Err(panic) = std::panic::catch_unwind(invoke) {
                warn!(
                    stream = %self.shared.id,
                    reason = panic_message(&panic),
                    "stream callback panicked, continuing"
                );
            }
        }
        match self.error() {
            Some(error) => Err(error),
            None => Ok(self.response()),
        }
    }

    /// Pause delivery; the producer keeps consuming the connection but
    /// discards chunks.
    pub fn pause(&self) -> bool {
        self.transition(StreamState::Paused)
    }

    pub fn resume(&self) -> bool {
        self.transition(StreamState::Active)
    }

    /// Cancel the stream: signal the producer, then join it within
    /// [`JOIN_TIMEOUT`], aborting (and thereby dropping the transport) if
    /// the join runs over.
    pub async fn cancel(&self) {
        {
            let mut body = self.shared.body.lock();
            if !body.state.is_terminal() {
                body.state = StreamState::Cancelled;
                body.metrics.finished_at = Some(Instant::now());
            }
        }
        self.join_producer().await;
    }

    /// Release all resources. Equivalent to `cancel` for a live stream;
    /// for a finished one it only reaps the producer task.
    pub async fn close(&self) {
        if self.state().is_terminal() {
            self.join_producer().await;
        } else {
            self.cancel().await;
        }
    }

    fn transition(&self, to: StreamState) -> bool {
        let mut body = self.shared.body.lock();
        if body.state.can_transition(to) {
            body.state = to;
            true
        } else {
            false
        }
    }

    async fn join_producer(&self) {
        let handle = {
            let mut slot = self.producer.lock();
            match std::mem::replace(&mut *slot, ProducerSlot::Finished) {
                ProducerSlot::Running(handle) => Some(handle),
                ProducerSlot::Idle(_) | ProducerSlot::Finished => None,
            }
        };
        if let Some(mut handle) = handle {
            if tokio::time::timeout(JOIN_TIMEOUT, &mut handle).await.is_err() {
                warn!(stream = %self.shared.id, "producer join timed out, aborting");
                handle.abort();
            }
        }
    }
}

impl Drop for StreamHandler {
    fn drop(&mut self) {
        // Abandoned handler: kill the producer so the connection releases.
        if let ProducerSlot::Running(handle) = &*self.producer.get_mut() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

impl std::fmt::Debug for StreamHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandler")
            .field("id", &self.shared.id)
            .field("provider", &self.shared.provider)
            .field("model", &self.shared.model)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Producer loop: read wire chunks, split into lines, gate on the handler
/// state, decode, and fold events into the shared body.
async fn produce<S, E>(shared: Arc<HandlerShared>, source: S, mut decoder: Box<dyn ChunkDecoder>)
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut source = Box::pin(source);
    let mut pending = String::new();

    while let Some(next) = source.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(error) => {
                shared.fail(ProviderError::stream_error(
                    shared.provider,
                    format!("transport error: {error}"),
                ));
                return;
            }
        };

        pending.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(newline) = pending.find('\n') {
            let line: String = pending.drain(..=newline).collect();
            let line = line.trim();

            match shared.state() {
                StreamState::Cancelled => {
                    debug!(stream = %shared.id, "producer exiting on cancellation");
                    return;
                }
                // Consume to keep the connection alive, but discard.
                StreamState::Paused => continue,
                _ => {}
            }

            if line.is_empty() {
                continue;
            }
            match decoder.decode_line(line) {
                Ok(Some(event)) => {
                    if shared.apply_event(event) {
                        return;
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(stream = %shared.id, %error, "skipping undecodable line");
                }
            }
        }
    }

    // Source ended without an explicit terminal marker.
    shared.finalize_if_running();
}

/// Decoder for script-fed handlers: `{"text": ...}` deltas and a final
/// `{"done": true}` marker.
struct ScriptDecoder;

impl ChunkDecoder for ScriptDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Option<StreamEvent>, ProviderError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| ProviderError::stream_error("mock", format!("bad script line: {e}")))?;
        if value.get("done").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(Some(StreamEvent::done()));
        }
        Ok(value
            .get("text")
            .and_then(Value::as_str)
            .map(StreamEvent::delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::response::CostEstimate;

    fn script_handler(chunks: &[&str]) -> StreamHandler {
        let initial = ModelResponse::new(
            "mock",
            "mock-model",
            "",
            TokenUsage::zero(),
            CostEstimate::zero(),
        );
        StreamHandler::from_script(
            "mock",
            "mock-model",
            initial,
            PriceTable::free(),
            chunks.iter().map(|c| c.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_chunks_arrive_in_order() {
        let handler = script_handler(&["a", "b", "c"]);
        handler.start();

        let mut collected = Vec::new();
        while let Some(chunk) = handler.next_chunk().await {
            collected.push(chunk);
        }

        assert_eq!(collected, vec!["a", "b", "c"]);
        assert_eq!(handler.state(), StreamState::Completed);
        assert_eq!(handler.response().content, "abc");
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let handler = script_handler(&["x"]);
        handler.start();
        handler.start();
        handler.start();

        let response = handler.process_stream(|_, _| {}).await.unwrap();
        assert_eq!(response.content, "x");
        assert_eq!(handler.metrics().chunk_count, 1);
    }

    #[tokio::test]
    async fn test_finalization_estimates_tokens_and_reason() {
        let handler = script_handler(&["hel", "lo"]);
        handler.start();
        let response = handler.process_stream(|_, _| {}).await.unwrap();

        assert_eq!(response.content, "hello");
        // five characters, four characters per token
        assert_eq!(response.usage.output_tokens, 1);
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.cost.total_cost, 0.0);
    }

    #[tokio::test]
    async fn test_process_stream_invokes_callback_per_chunk() {
        let handler = script_handler(&["1", "2", "3"]);
        let mut seen = Vec::new();
        handler
            .process_stream(|chunk, response| {
                seen.push((chunk.to_string(), response.content.clone()));
            })
            .await
            .unwrap();

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].0, "3");
        assert!(seen[2].1.ends_with('3'));
    }

    #[tokio::test]
    async fn test_callback_panic_does_not_abort_processing() {
        let handler = script_handler(&["a", "b", "c"]);
        let mut seen = Vec::new();
        let response = handler
            .process_stream(|chunk, _| {
                if chunk == "b" {
                    panic!("callback failure");
                }
                seen.push(chunk.to_string());
            })
            .await
            .unwrap();

        // the panicking chunk is skipped, the rest keep flowing
        assert_eq!(seen, vec!["a", "c"]);
        assert_eq!(response.content, "abc");
        assert_eq!(handler.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn test_read_and_read_all() {
        let handler = script_handler(&["a", "b"]);
        handler.start();

        // wait for completion, then drain synchronously
        while !handler.state().is_terminal() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let first = handler.read();
        assert_eq!(first.as_deref(), Some("a"));
        assert_eq!(handler.read_all(), vec!["b"]);
        assert!(handler.read().is_none());
    }

    #[tokio::test]
    async fn test_cancel_reaches_terminal_state() {
        let handler = script_handler(&["a", "b", "c", "d"]);
        handler.start();
        handler.cancel().await;

        assert_eq!(handler.state(), StreamState::Cancelled);
        assert!(handler.next_chunk().await.is_none() || handler.state().is_terminal());
    }

    #[tokio::test]
    async fn test_pause_resume_transitions() {
        // A producer blocked on an idle source keeps the state stable.
        let initial = ModelResponse::new(
            "mock",
            "mock-model",
            "",
            TokenUsage::zero(),
            CostEstimate::zero(),
        );
        let handler = StreamHandler::from_byte_stream(
            "mock",
            "mock-model",
            initial,
            PriceTable::free(),
            futures::stream::pending::<Result<Bytes, std::convert::Infallible>>(),
            Box::new(ScriptDecoder),
        );

        // pause before starting is rejected: initializing cannot pause
        assert!(!handler.pause());

        handler.start();
        assert!(handler.pause());
        assert_eq!(handler.state(), StreamState::Paused);
        assert!(handler.resume());
        assert_eq!(handler.state(), StreamState::Active);

        handler.cancel().await;
        assert_eq!(handler.state(), StreamState::Cancelled);
    }

    #[tokio::test]
    async fn test_close_on_completed_stream_is_clean() {
        let handler = script_handler(&["z"]);
        handler.start();
        let _ = handler.process_stream(|_, _| {}).await;
        handler.close().await;
        assert_eq!(handler.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn test_chunk_stream_yields_all() {
        let handler = script_handler(&["x", "y"]);
        handler.start();
        let collected: Vec<String> = handler.chunk_stream().collect().await;
        assert_eq!(collected, vec!["x", "y"]);
    }
}
