//! Stream lifecycle states and per-stream metrics

use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle of one streaming request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Initializing,
    Active,
    Paused,
    Cancelled,
    Completed,
    Error,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Cancelled | StreamState::Completed | StreamState::Error
        )
    }

    /// Transitions reachable through the public handler operations.
    pub fn can_transition(&self, to: StreamState) -> bool {
        use StreamState::*;
        match (self, to) {
            (Initializing, Active) | (Initializing, Cancelled) => true,
            (Active, Paused) | (Active, Cancelled) | (Active, Completed) | (Active, Error) => true,
            (Paused, Active) | (Paused, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamState::Initializing => "initializing",
            StreamState::Active => "active",
            StreamState::Paused => "paused",
            StreamState::Cancelled => "cancelled",
            StreamState::Completed => "completed",
            StreamState::Error => "error",
        })
    }
}

/// Counters and timings for one stream
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamMetrics {
    pub chunk_count: u64,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub estimated_tokens: u64,
}

impl StreamMetrics {
    /// Wall-clock duration of the stream, while running or after the end.
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(match self.finished_at {
            Some(finished) => finished.duration_since(started),
            None => started.elapsed(),
        })
    }
}
