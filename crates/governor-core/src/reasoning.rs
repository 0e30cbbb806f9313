use serde::{Deserialize, Serialize};

/// Reasoning-effort hint passed to the LLM, scaled by tool-call volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
    Disable,
}

/// An integer hint controlling chain-of-thought depth, together with the
/// effort level it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub effort: ReasoningEffort,
    pub budget: u32,
}

impl ReasoningConfig {
    #[must_use]
    pub fn new(effort: ReasoningEffort, budget: u32) -> Self {
        Self { effort, budget }
    }
}
