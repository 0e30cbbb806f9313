use serde::{Deserialize, Serialize};

/// Stage in the workflow state machine. ANALYZE is the start state; VERIFY is
/// terminal for automatic transitions (only [`force_phase`] can leave it).
///
/// [`force_phase`]: https://docs.rs/governor-policy (see `StateMachine::force_phase`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Analyze,
    Modify,
    Verify,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Analyze
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Analyze => "ANALYZE",
            Phase::Modify => "MODIFY",
            Phase::Verify => "VERIFY",
        };
        f.write_str(s)
    }
}
