//! Tool interceptor, workflow state machine, and the repository / test-
//! command policy that together decide whether a proposed tool call is
//! permitted, transformed, or blocked.

mod clock;
mod exploration;
mod interceptor;
mod path_mapper;
mod repository;
mod state_machine;
mod submit_review;
mod test_analysis;

pub use clock::{Clock, FakeClock, SystemClock};
pub use exploration::{
    exploration_score, recommendations, bucket, ExplorationBucket, ExplorationSnapshot,
    Priority, ProgressiveGuidanceEscalator, Recommendation,
};
pub use interceptor::{
    extract_exit_code, normalize_output, Decision, Interceptor, ToolExecutionRecord,
    GIT_CHECKOUT_BAN_MESSAGE, GIT_SWITCH_BAN_MESSAGE,
};
pub use path_mapper::{map_args_xml, map_source_to_target, map_target_to_source};
pub use repository::{get_repository_config, get_repository_config_with_overrides, repo_key_from_instance_id};
pub use state_machine::StateMachine;
pub use submit_review::{SubmitReviewGate, REVIEW_REMINDER};
pub use test_analysis::{
    analyze_command, classify_command, confidence_score, contains_test_command, extract_test_names,
    is_test_command, output_indicates_success, split_segments, CommandAnalysis, CommandClass,
    EffectivenessEntry, EffectivenessSummary, EffectivenessTracker, MAX_EFFECTIVENESS_HISTORY,
};
