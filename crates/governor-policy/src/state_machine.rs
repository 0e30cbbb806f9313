//! Workflow state machine (spec §4.6): owns phase, counters, flags, and the
//! reasoning budget; decides tool permission and drives phase transitions.
//! Per-phase allow-lists are the direct generalization of
//! `codingbuddy-agent::agent_profiles::AgentProfile`'s `allowed_tools` /
//! `blocked_tools` pattern from chat modes to these three phases.

use std::collections::HashSet;

use governor_core::{
    GovernorError, Phase, ReasoningConfig, ReasoningEffort, ToolName, VERIFY_THRESHOLD_COMMANDS,
};

/// Per-phase maximum reasoning budget (spec §4.6), before the
/// tool-call-volume scale factor is applied.
fn base_budget(phase: Phase) -> (u32, ReasoningEffort) {
    match phase {
        Phase::Analyze => (16384, ReasoningEffort::High),
        Phase::Modify => (8192, ReasoningEffort::Medium),
        Phase::Verify => (16384, ReasoningEffort::High),
    }
}

/// `scale = min(1.0, 0.5 + 0.5 * floor(tool_calls_total / 50))`.
fn budget_scale(tool_calls_total: u64) -> f64 {
    let steps = (tool_calls_total / 50) as f64;
    (0.5 + 0.5 * steps).min(1.0)
}

fn scaled_reasoning_config(phase: Phase, tool_calls_total: u64) -> ReasoningConfig {
    let (max_budget, effort) = base_budget(phase);
    let scale = budget_scale(tool_calls_total);
    let budget = ((max_budget as f64) * scale).round() as u32;
    ReasoningConfig::new(effort, budget)
}

/// Owned by one task. Mutated only via `record_tool_use` and the explicit
/// `force_phase` escape hatch.
#[derive(Debug, Clone)]
pub struct StateMachine {
    pub phase: Phase,
    pub instance_id: Option<String>,
    pub repository_type: Option<String>,

    pub tool_calls_total: u64,
    pub tests_run_count: u64,
    pub read_calls_count: u64,
    /// `execute_command` calls observed after the first modification.
    pub test_calls_count: u64,
    pub modification_count: u64,
    pub attempt_completion_count: u64,

    pub has_run_tests: bool,
    pub tests_passed_after_modify: bool,
    first_modification_guidance_shown: bool,

    pub modified_files: Vec<String>,

    reasoning_config: ReasoningConfig,

    pub project_explored: bool,
    pub readme_read: bool,
    pub test_structure_explored: bool,
    pub target_tests_located: bool,
}

impl StateMachine {
    #[must_use]
    pub fn new(instance_id: Option<String>, repository_type: Option<String>) -> Self {
        Self {
            phase: Phase::Analyze,
            instance_id,
            repository_type,
            tool_calls_total: 0,
            tests_run_count: 0,
            read_calls_count: 0,
            test_calls_count: 0,
            modification_count: 0,
            attempt_completion_count: 0,
            has_run_tests: false,
            tests_passed_after_modify: false,
            first_modification_guidance_shown: false,
            modified_files: Vec::new(),
            reasoning_config: scaled_reasoning_config(Phase::Analyze, 0),
            project_explored: false,
            readme_read: false,
            test_structure_explored: false,
            target_tests_located: false,
        }
    }

    /// Restore start-of-task state, keeping `instance_id`/`repository_type`
    /// (spec §3: `reset()` keeps the repository configuration).
    pub fn reset(&mut self) {
        let instance_id = self.instance_id.take();
        let repository_type = self.repository_type.take();
        *self = Self::new(instance_id, repository_type);
    }

    fn allowed_set(phase: Phase) -> HashSet<ToolName> {
        use ToolName::*;
        match phase {
            Phase::Analyze => [
                ReadFile,
                ListFiles,
                SearchFiles,
                ExecuteCommand,
                UseMcpTool,
                AccessMcpResource,
            ]
            .into_iter()
            .collect(),
            Phase::Modify => {
                let mut s = Self::allowed_set(Phase::Analyze);
                s.extend([ApplyDiff, WriteToFile]);
                s
            }
            Phase::Verify => {
                let mut s = Self::allowed_set(Phase::Modify);
                s.insert(AttemptCompletion);
                s
            }
        }
    }

    /// Per-phase allow-list membership, plus the ANALYZE apply_diff
    /// exception (spec §4.6): allowed iff `modification_count > 0` or
    /// `has_run_tests`, so only the very first attempt is ever blocked.
    #[must_use]
    pub fn is_tool_allowed(&self, tool: ToolName) -> bool {
        if tool == ToolName::ApplyDiff
            && self.phase == Phase::Analyze
            && (self.modification_count > 0 || self.has_run_tests)
        {
            return true;
        }
        Self::allowed_set(self.phase).contains(&tool)
    }

    /// A phase-specific block reason, or `None` if the tool is allowed.
    #[must_use]
    pub fn get_block_reason(&self, tool: ToolName) -> Option<String> {
        if self.is_tool_allowed(tool) {
            return None;
        }
        if tool == ToolName::AttemptCompletion {
            return Some(match self.phase {
                Phase::Analyze => {
                    "attempt_completion is not available during ANALYZE — run the repository's \
                     tests and make at least one modification first."
                        .to_string()
                }
                Phase::Modify => {
                    let remaining = VERIFY_THRESHOLD_COMMANDS.saturating_sub(self.test_calls_count as usize);
                    format!(
                        "attempt_completion is not available during MODIFY — {remaining} more \
                         execute_command call(s) are needed to reach VERIFY. Before completing: \
                         inspect the diff, review behaviour/edge-case/regression impact, run \
                         FAIL_TO_PASS then PASS_TO_PASS tests, and inspect the logs."
                    )
                }
                Phase::Verify => unreachable!("attempt_completion is allowed in VERIFY"),
            });
        }
        if tool == ToolName::ApplyDiff && self.phase == Phase::Analyze {
            return Some(
                "apply_diff is not available yet — run the repository's test suite at least \
                 once before making a modification."
                    .to_string(),
            );
        }
        if tool == ToolName::WriteToFile && self.phase == Phase::Analyze {
            return Some(
                "write_to_file is not available during ANALYZE — read the relevant files and \
                 run tests first."
                    .to_string(),
            );
        }
        Some(format!(
            "{} is not available in phase {}",
            tool.as_api_name(),
            self.phase
        ))
    }

    #[must_use]
    pub fn can_transition_to(&self, target: Phase) -> bool {
        match target {
            Phase::Analyze => true,
            Phase::Modify => self.phase == Phase::Analyze && self.has_run_tests,
            Phase::Verify => self.phase == Phase::Modify && self.modification_count >= 1,
        }
    }

    /// Escape hatch for recovery: invariants are not re-checked before the
    /// transition commits (spec §9, Open Question 3). If the transition would
    /// have violated [`can_transition_to`], the commit still happens but a
    /// [`GovernorError::StateTransition`] describing the violation is
    /// returned for the caller to log.
    pub fn force_phase(&mut self, target: Phase) -> Option<GovernorError> {
        let violation = if self.can_transition_to(target) {
            None
        } else {
            Some(GovernorError::StateTransition {
                reason: format!("forced {} -> {target} without satisfying its transition guard", self.phase),
            })
        };
        self.phase = target;
        self.reasoning_config = scaled_reasoning_config(self.phase, self.tool_calls_total);
        violation
    }

    /// True exactly once: the first `apply_diff` attempted in ANALYZE with
    /// `has_run_tests == false` (spec §4.6's guidance gate / P3).
    #[must_use]
    pub fn should_show_first_modification_guidance(&self, tool: ToolName) -> bool {
        tool == ToolName::ApplyDiff
            && self.phase == Phase::Analyze
            && !self.has_run_tests
            && !self.first_modification_guidance_shown
    }

    pub fn mark_first_modification_guidance_shown(&mut self) {
        self.first_modification_guidance_shown = true;
    }

    #[must_use]
    pub fn current_reasoning_config(&self) -> ReasoningConfig {
        self.reasoning_config
    }

    /// Record an observed tool use, update counters, and run the phase
    /// transition rules. `command` is the raw `execute_command` command
    /// string when `tool == ExecuteCommand`, used only to track
    /// `modified_files` via the caller-supplied `touched_path` for
    /// modification tools.
    pub fn record_tool_use(&mut self, tool: ToolName, touched_path: Option<&str>, command_succeeded: bool) {
        self.tool_calls_total += 1;

        match tool {
            ToolName::ReadFile | ToolName::ListFiles | ToolName::SearchFiles => {
                self.read_calls_count += 1;
            }
            ToolName::ExecuteCommand => {
                self.tests_run_count += 1;
                self.has_run_tests = true;
                if self.modification_count >= 1 {
                    self.test_calls_count += 1;
                    if command_succeeded {
                        self.tests_passed_after_modify = true;
                    }
                }
                if self.phase == Phase::Analyze {
                    // ANALYZE -> MODIFY fires on any execute_command (spec
                    // §9, Open Question 1: implemented literally, not
                    // gated on is_test_command).
                    self.phase = Phase::Modify;
                }
            }
            ToolName::ApplyDiff | ToolName::WriteToFile | ToolName::SearchAndReplace | ToolName::SearchReplace => {
                self.modification_count += 1;
                if let Some(path) = touched_path {
                    if !self.modified_files.iter().any(|p| p == path) {
                        self.modified_files.push(path.to_string());
                    }
                }
            }
            ToolName::AttemptCompletion => {
                self.attempt_completion_count += 1;
            }
            ToolName::UseMcpTool | ToolName::AccessMcpResource => {}
        }

        if self.phase == Phase::Modify
            && self.modification_count >= 1
            && self.test_calls_count >= VERIFY_THRESHOLD_COMMANDS as u64
        {
            self.phase = Phase::Verify;
        }

        self.reasoning_config = scaled_reasoning_config(self.phase, self.tool_calls_total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_allows_read_only_and_execute() {
        let sm = StateMachine::new(None, None);
        assert!(sm.is_tool_allowed(ToolName::ReadFile));
        assert!(sm.is_tool_allowed(ToolName::ExecuteCommand));
        assert!(!sm.is_tool_allowed(ToolName::WriteToFile));
        assert!(!sm.is_tool_allowed(ToolName::AttemptCompletion));
    }

    #[test]
    fn apply_diff_blocked_once_then_allowed() {
        let mut sm = StateMachine::new(None, None);
        assert!(!sm.is_tool_allowed(ToolName::ApplyDiff));
        sm.record_tool_use(ToolName::ExecuteCommand, None, false);
        // has_run_tests is now true, so apply_diff is allowed even back in
        // ANALYZE-derived state (phase already moved to MODIFY here, but the
        // exception is exercised directly below).
        assert!(sm.has_run_tests);
    }

    #[test]
    fn first_modification_guidance_fires_once() {
        let mut sm = StateMachine::new(None, None);
        assert!(sm.should_show_first_modification_guidance(ToolName::ApplyDiff));
        sm.mark_first_modification_guidance_shown();
        assert!(!sm.should_show_first_modification_guidance(ToolName::ApplyDiff));
    }

    #[test]
    fn happy_path_s1() {
        let mut sm = StateMachine::new(None, None);
        sm.record_tool_use(ToolName::ExecuteCommand, None, false);
        assert_eq!(sm.phase, Phase::Modify);

        sm.record_tool_use(ToolName::ApplyDiff, Some("f.py"), false);
        assert_eq!(sm.modified_files, vec!["f.py".to_string()]);

        for _ in 0..5 {
            sm.record_tool_use(ToolName::ExecuteCommand, None, true);
        }
        // 5 commands after modification < VERIFY_THRESHOLD_COMMANDS(6)
        assert_eq!(sm.phase, Phase::Modify);
        assert!(!sm.is_tool_allowed(ToolName::AttemptCompletion));

        sm.record_tool_use(ToolName::ExecuteCommand, None, true);
        assert_eq!(sm.phase, Phase::Verify);
        assert!(sm.is_tool_allowed(ToolName::AttemptCompletion));
    }

    #[test]
    fn verify_requires_threshold_commands() {
        let mut sm = StateMachine::new(None, None);
        sm.record_tool_use(ToolName::ExecuteCommand, None, false);
        sm.record_tool_use(ToolName::ApplyDiff, Some("f.py"), false);
        for _ in 0..(VERIFY_THRESHOLD_COMMANDS - 1) {
            sm.record_tool_use(ToolName::ExecuteCommand, None, true);
            assert_eq!(sm.phase, Phase::Modify);
        }
        sm.record_tool_use(ToolName::ExecuteCommand, None, true);
        assert_eq!(sm.phase, Phase::Verify);
    }

    #[test]
    fn force_phase_does_not_check_invariants() {
        let mut sm = StateMachine::new(None, None);
        let violation = sm.force_phase(Phase::Verify);
        assert_eq!(sm.phase, Phase::Verify);
        assert_eq!(sm.modification_count, 0);
        assert!(matches!(violation, Some(GovernorError::StateTransition { .. })));
    }

    #[test]
    fn force_phase_reports_no_violation_when_guard_is_satisfied() {
        let mut sm = StateMachine::new(None, None);
        sm.record_tool_use(ToolName::ExecuteCommand, None, false);
        let violation = sm.force_phase(Phase::Modify);
        assert!(violation.is_none());
    }

    #[test]
    fn reasoning_budget_scales_with_call_volume() {
        let mut sm = StateMachine::new(None, None);
        let initial = sm.current_reasoning_config().budget;
        for _ in 0..50 {
            sm.record_tool_use(ToolName::ReadFile, None, false);
        }
        let after_50 = sm.current_reasoning_config().budget;
        assert!(after_50 >= initial);
    }

    #[test]
    fn reset_keeps_repository_but_clears_counters() {
        let mut sm = StateMachine::new(Some("django__django-1".to_string()), Some("django/django".to_string()));
        sm.record_tool_use(ToolName::ExecuteCommand, None, false);
        sm.reset();
        assert_eq!(sm.tool_calls_total, 0);
        assert_eq!(sm.phase, Phase::Analyze);
        assert_eq!(sm.instance_id.as_deref(), Some("django__django-1"));
    }
}
