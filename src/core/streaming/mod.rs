//! Streaming: per-request producer tasks, chunk buffers, and lifecycle

pub mod handler;
pub mod state;

pub use handler::{ChunkDecoder, JOIN_TIMEOUT, StreamEvent, StreamHandler};
pub use state::{StreamMetrics, StreamState};
