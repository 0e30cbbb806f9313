//! Fixed, bit-exact constants. Every tuning knob a caller might want to
//! override lives instead in [`crate::GovernorConfig`]; these are values
//! pinned down exactly, asserted against literally in tests.

/// Number of `execute_command` calls after the first modification required
/// before MODIFY can transition to VERIFY.
pub const VERIFY_THRESHOLD_COMMANDS: usize = 6;

/// Consecutive `apply_diff` calls before the first-jinnang guidance fires.
pub const MAX_CONSECUTIVE_APPLY_DIFF: usize = 3;

/// Max entries kept in the interceptor's tool execution history.
pub const MAX_HISTORY_SIZE: usize = 50;

/// Max entries kept in the interceptor's output history.
pub const MAX_OUTPUT_HISTORY_SIZE: usize = 20;

/// Stagnation threshold: no recorded tool call for this long triggers the
/// stagnation loop detector.
pub const STAGNATION_MS: u64 = 5 * 60 * 1000;

/// Percentage (of usable context) that triggers condensation.
pub const CONDENSE_THRESHOLD_PCT: f64 = 0.70;

/// Paired tool_use/tool_result steps kept verbatim by standard condensation.
pub const KEEP_TOOL_RESULTS: usize = 4;

/// Paired steps kept by the aggressive condensation retry.
pub const KEEP_TOOL_RESULTS_AGGRESSIVE: usize = 2;

/// Max retained tool_result / tool_use input length (standard tier).
pub const MAX_TOOL_RESULT_LENGTH: usize = 8000;

/// Max retained tool_result / tool_use input length (aggressive retry tier).
pub const MAX_TOOL_RESULT_LENGTH_AGGRESSIVE: usize = 4000;

/// Max length of a kept `tool_use` input field before truncation.
pub const MAX_TOOL_USE_INPUT_LENGTH: usize = 2000;

/// Fraction of the context window reserved as headroom when computing the
/// usable budget.
pub const TOKEN_BUFFER_PCT: f64 = 0.10;

/// Minimum acceptable summary size; the compressor re-requests up to
/// [`MAX_SUMMARY_ENHANCEMENT_ATTEMPTS`] times until it is met.
pub const MIN_SUMMARY_TOKENS: u64 = 2000;

/// Max number of re-requests for an under-sized summary.
pub const MAX_SUMMARY_ENHANCEMENT_ATTEMPTS: usize = 3;

/// Minimum number of messages that must separate two summaries.
pub const MIN_MESSAGES_BETWEEN_SUMMARIES: usize = 20;

/// Target utilization (of usable context) after condensation; exceeding this
/// triggers the aggressive retry tier.
pub const POST_CONDENSE_TARGET_UTILIZATION: f64 = 0.40;

/// Default path-mapping source prefix (the testbed/runner side).
pub const DEFAULT_SOURCE_PREFIX: &str = "/testbed";

/// Default path-mapping target prefix (the agent-visible side).
pub const DEFAULT_TARGET_PREFIX: &str = "/workspace/repo";

/// Every this-many tool calls, the reasoning budget scale step advances and
/// a budget-increase notice is emitted.
pub const BUDGET_STEP_CALLS: u64 = 50;
