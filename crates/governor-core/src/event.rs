use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Phase;

/// A structured event emitted by the policy engine for observability.
/// Mirrors the shape of `codingbuddy_core::EventKind` (tag/payload
/// serialization) trimmed to what this engine actually reports — it does not
/// need chat-turn or subagent events, only decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventKind {
    ToolAllowed { tool: String },
    ToolBlocked { tool: String, reason: String },
    ToolGuidance { tool: String, guidance: String },
    PhaseTransition { from: Phase, to: Phase, forced: bool },
    LoopDetected { detector: String },
    CondensationRun { original_tokens: u64, condensed_tokens: u64, tier: String },
    CondensationSkipped { reason: String },
    Warning { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub seq_no: u64,
    pub at: DateTime<Utc>,
    pub task_id: Uuid,
    pub kind: EventKind,
}
