//! Declarative capability model used for task-aware provider selection
//!
//! Providers rate themselves on a small set of axes; task types map to the
//! strengths they need; scoring is a pure function of the two.

use serde_json::Value;
use std::collections::HashMap;

/// Ordered rating of a provider's ability on one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapabilityStrength {
    None,
    Basic,
    Moderate,
    Strong,
    Exceptional,
}

impl CapabilityStrength {
    pub fn value(self) -> i32 {
        match self {
            CapabilityStrength::None => 0,
            CapabilityStrength::Basic => 1,
            CapabilityStrength::Moderate => 2,
            CapabilityStrength::Strong => 3,
            CapabilityStrength::Exceptional => 4,
        }
    }

    pub fn from_value(value: u64) -> Self {
        match value {
            0 => CapabilityStrength::None,
            1 => CapabilityStrength::Basic,
            2 => CapabilityStrength::Moderate,
            3 => CapabilityStrength::Strong,
            _ => CapabilityStrength::Exceptional,
        }
    }
}

/// Capability axes providers declare strengths for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Reasoning,
    CodeGeneration,
    CreativeWriting,
    Math,
    Vision,
    Conversation,
    Local,
    Inexpensive,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Reasoning => "reasoning",
            Capability::CodeGeneration => "code_generation",
            Capability::CreativeWriting => "creative_writing",
            Capability::Math => "math",
            Capability::Vision => "vision",
            Capability::Conversation => "conversation",
            Capability::Local => "local",
            Capability::Inexpensive => "inexpensive",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reasoning" => Some(Capability::Reasoning),
            "code_generation" => Some(Capability::CodeGeneration),
            "creative_writing" => Some(Capability::CreativeWriting),
            "math" => Some(Capability::Math),
            "vision" => Some(Capability::Vision),
            "conversation" => Some(Capability::Conversation),
            "local" => Some(Capability::Local),
            "inexpensive" => Some(Capability::Inexpensive),
            _ => None,
        }
    }
}

/// Task label detected from a prompt or supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    CreativeWriting,
    CodeGeneration,
    AnalyticalReasoning,
    Math,
    Vision,
    GeneralChat,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::CreativeWriting => "creative_writing",
            TaskType::CodeGeneration => "code_generation",
            TaskType::AnalyticalReasoning => "analytical_reasoning",
            TaskType::Math => "math",
            TaskType::Vision => "vision",
            TaskType::GeneralChat => "general_chat",
        }
    }
}

const VISION_MARKERS: &[&str] = &["image", "picture", "photo", "diagram", "screenshot"];
const MATH_MARKERS: &[&str] = &[
    "prove", "theorem", "equation", "integral", "derivative", "irrational", "solve for",
    "calculate",
];
const CODE_MARKERS: &[&str] = &[
    "code", "function", "implement", "debug", "compile", "script", "regex", "refactor",
    "unit test",
];
const CREATIVE_MARKERS: &[&str] = &["story", "poem", "fiction", "haiku", "novel", "creative"];
const ANALYTICAL_MARKERS: &[&str] = &[
    "analyze", "analyse", "compare", "evaluate", "assess", "pros and cons", "explain why",
    "argue",
];

/// Detect the task type from a prompt by keyword heuristics.
pub fn detect_task_type(prompt: &str) -> TaskType {
    let prompt = prompt.to_lowercase();
    let matches_any = |markers: &[&str]| markers.iter().any(|m| prompt.contains(m));

    if matches_any(VISION_MARKERS) {
        TaskType::Vision
    } else if matches_any(MATH_MARKERS) {
        TaskType::Math
    } else if matches_any(CODE_MARKERS) {
        TaskType::CodeGeneration
    } else if matches_any(CREATIVE_MARKERS) {
        TaskType::CreativeWriting
    } else if matches_any(ANALYTICAL_MARKERS) {
        TaskType::AnalyticalReasoning
    } else {
        TaskType::GeneralChat
    }
}

/// Required capability strengths per task type.
pub fn required_capabilities(task: TaskType) -> &'static [(Capability, CapabilityStrength)] {
    match task {
        TaskType::CreativeWriting => &[
            (Capability::CreativeWriting, CapabilityStrength::Strong),
            (Capability::Conversation, CapabilityStrength::Moderate),
        ],
        TaskType::CodeGeneration => &[
            (Capability::CodeGeneration, CapabilityStrength::Strong),
            (Capability::Reasoning, CapabilityStrength::Moderate),
        ],
        TaskType::AnalyticalReasoning => &[(Capability::Reasoning, CapabilityStrength::Strong)],
        TaskType::Math => &[
            (Capability::Math, CapabilityStrength::Strong),
            (Capability::Reasoning, CapabilityStrength::Strong),
        ],
        TaskType::Vision => &[(Capability::Vision, CapabilityStrength::Strong)],
        TaskType::GeneralChat => &[(Capability::Conversation, CapabilityStrength::Basic)],
    }
}

/// Score a provider's fit for a task: a bonus when a requirement is met
/// (growing with the surplus), a penalty proportional to the shortfall
/// otherwise. Higher is better.
pub fn score_capabilities<F>(task: TaskType, strength_of: F) -> i32
where
    F: Fn(Capability) -> CapabilityStrength,
{
    let mut score = 0;
    for (capability, required) in required_capabilities(task) {
        let strength = strength_of(*capability);
        if strength >= *required {
            score += 10 + (strength.value() - required.value());
        } else {
            score -= 5 * (required.value() - strength.value());
        }
    }
    score
}

/// Parse a `capabilities` option map (`{name: 0..4}`) into overrides.
pub fn parse_capability_overrides(value: &Value) -> HashMap<Capability, CapabilityStrength> {
    let mut overrides = HashMap::new();
    if let Some(map) = value.as_object() {
        for (name, strength) in map {
            if let (Some(capability), Some(level)) =
                (Capability::from_name(name), strength.as_u64())
            {
                overrides.insert(capability, CapabilityStrength::from_value(level));
            }
        }
    }
    overrides
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strength_ordering() {
        assert!(CapabilityStrength::Exceptional > CapabilityStrength::Strong);
        assert!(CapabilityStrength::Basic > CapabilityStrength::None);
        assert_eq!(CapabilityStrength::Moderate.value(), 2);
    }

    #[test]
    fn test_detects_math_prompt() {
        assert_eq!(
            detect_task_type("Prove that √2 is irrational."),
            TaskType::Math
        );
    }

    #[test]
    fn test_detects_code_prompt() {
        assert_eq!(
            detect_task_type("Implement a function that reverses a list"),
            TaskType::CodeGeneration
        );
    }

    #[test]
    fn test_detects_creative_prompt() {
        assert_eq!(
            detect_task_type("Write me a short story about winter"),
            TaskType::CreativeWriting
        );
    }

    #[test]
    fn test_defaults_to_general_chat() {
        assert_eq!(detect_task_type("hello there"), TaskType::GeneralChat);
    }

    #[test]
    fn test_scoring_prefers_stronger_provider() {
        let strong = score_capabilities(TaskType::Math, |c| match c {
            Capability::Reasoning => CapabilityStrength::Strong,
            _ => CapabilityStrength::None,
        });
        let weak = score_capabilities(TaskType::Math, |c| match c {
            Capability::Reasoning => CapabilityStrength::Basic,
            _ => CapabilityStrength::None,
        });
        assert!(strong > weak);
    }

    #[test]
    fn test_surplus_earns_bonus() {
        let exact = score_capabilities(TaskType::AnalyticalReasoning, |_| CapabilityStrength::Strong);
        let surplus =
            score_capabilities(TaskType::AnalyticalReasoning, |_| CapabilityStrength::Exceptional);
        assert_eq!(exact, 10);
        assert_eq!(surplus, 11);
    }

    #[test]
    fn test_parse_overrides() {
        let overrides = parse_capability_overrides(&json!({
            "reasoning": 4,
            "vision": 1,
            "made_up": 3,
        }));
        assert_eq!(
            overrides.get(&Capability::Reasoning),
            Some(&CapabilityStrength::Exceptional)
        );
        assert_eq!(
            overrides.get(&Capability::Vision),
            Some(&CapabilityStrength::Basic)
        );
        assert_eq!(overrides.len(), 2);
    }
}
