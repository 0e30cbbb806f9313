use thiserror::Error;

/// The four recoverable error classes the policy engine distinguishes.
/// Every variant is handled at the call site — nothing here unwinds the
/// agent's call chain; callers match on the variant and apply its own
/// recovery rule.
#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("unknown repository for instance {instance_id:?}, using generic fallback")]
    RepositoryConfig { instance_id: String },

    #[error("template render failed for phase {phase:?}: {reason}")]
    TemplateRender { phase: String, reason: String },

    #[error("state transition invariant violated: {reason}")]
    StateTransition { reason: String },

    #[error("test command analysis failed: {reason}")]
    TestAnalysis { reason: String },
}
