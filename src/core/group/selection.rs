//! Selection strategies: pure orderings over a health-filtered snapshot

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::debug;

use crate::core::providers::ModelProvider;
use crate::core::providers::capabilities::{detect_task_type, score_capabilities};
use crate::core::types::message::MessageRole;
use crate::core::types::request::ModelRequest;

/// How a group orders its candidates for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    /// Original order
    #[default]
    Failover,
    /// Rotate a cursor held in the group context
    RoundRobin,
    /// Shuffle per call
    Random,
    /// Cheapest backend first
    CostOptimized,
    /// Detect the task from the last user message and order by
    /// capability fit
    TaskAware,
}

/// Mutable state owned by the group for stateful strategies
#[derive(Debug, Default)]
pub(crate) struct SelectionContext {
    pub round_robin_index: usize,
}

impl SelectionStrategy {
    pub(crate) fn order(
        &self,
        candidates: &[usize],
        providers: &[Arc<dyn ModelProvider>],
        context: &mut SelectionContext,
        request: &ModelRequest,
    ) -> Vec<usize> {
        match self {
            SelectionStrategy::Failover => candidates.to_vec(),
            SelectionStrategy::RoundRobin => {
                if candidates.is_empty() {
                    return Vec::new();
                }
                let start = context.round_robin_index % candidates.len();
                context.round_robin_index = (start + 1) % candidates.len();
                let mut ordered = candidates[start..].to_vec();
                ordered.extend_from_slice(&candidates[..start]);
                ordered
            }
            SelectionStrategy::Random => {
                let mut ordered = candidates.to_vec();
                ordered.shuffle(&mut rand::thread_rng());
                ordered
            }
            SelectionStrategy::CostOptimized => {
                let mut ordered = candidates.to_vec();
                ordered.sort_by_key(|&index| cost_rank(providers[index].name()));
                ordered
            }
            SelectionStrategy::TaskAware => order_by_task_fit(candidates, providers, request),
        }
    }
}

/// Relative cost ranking; unknown backends sort last.
fn cost_rank(name: &str) -> u32 {
    match name.to_ascii_lowercase().as_str() {
        "mock" => 0,
        "ollama" => 1,
        "openai" => 2,
        "anthropic" => 3,
        _ => 999,
    }
}

fn order_by_task_fit(
    candidates: &[usize],
    providers: &[Arc<dyn ModelProvider>],
    request: &ModelRequest,
) -> Vec<usize> {
    let Some(prompt) = last_user_prompt(request) else {
        return candidates.to_vec();
    };
    let task = detect_task_type(&prompt);

    let mut scored: Vec<(usize, i32)> = candidates
        .iter()
        .map(|&index| {
            let provider = &providers[index];
            let score =
                score_capabilities(task, |capability| provider.get_capability_strength(capability));
            (index, score)
        })
        .collect();
    // stable: ties keep the incoming order
    scored.sort_by_key(|(_, score)| std::cmp::Reverse(*score));

    if tracing::enabled!(tracing::Level::DEBUG) {
        let ranking: Vec<String> = scored
            .iter()
            .map(|(index, score)| format!("{}:{score}", providers[*index].name()))
            .collect();
        debug!(task = task.as_str(), ranking = ranking.join(", "), "task-aware ordering");
    }

    scored.into_iter().map(|(index, _)| index).collect()
}

fn last_user_prompt(request: &ModelRequest) -> Option<String> {
    request
        .messages
        .iter()
        .rev()
        .find(|message| message.role == MessageRole::User)
        .map(|message| message.content.flattened_text())
        .filter(|prompt| !prompt.is_empty())
}
