//! Prompt Generator (spec §4.5): render phase-guidance templates containing
//! `{{var}}` substitution and `{{#if var}}…{{/if}}` / `{{#if
//! var}}…{{else}}…{{/if}}` conditionals, with a deterministic fallback on
//! any rendering error. No templating crate appears anywhere in the
//! retrieved reference corpus; the teacher's own habit for structured text
//! is an inline constant template filled by string formatting (see
//! `COMPACTION_TEMPLATE` in `codingbuddy-agent/src/tool_loop/compaction.rs`)
//! — a bespoke mini-engine is the idiom here, not a gap.

use std::collections::HashMap;
use std::sync::LazyLock;

use governor_core::{GovernorError, Phase};

/// Max fixpoint iterations for conditional resolution before giving up and
/// falling back (spec §4.5).
pub const MAX_CONDITIONAL_ITERATIONS: usize = 10;

/// A single rendering pass's output: the rendered text plus any warnings
/// about missing variables (spec §9: "no exceptions escape the core
/// surface" — rendering returns a result record instead).
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub text: String,
    pub warnings: Vec<String>,
    pub used_fallback: bool,
}

static IF_BLOCK: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?s)\{\{#if\s+(\w+)\}\}((?:(?!\{\{#if\b).)*?)\{\{/if\}\}").unwrap()
});

static VAR_PLACEHOLDER: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\{\{(\w+)\}\}").unwrap());

fn is_truthy(vars: &HashMap<String, String>, name: &str) -> bool {
    match vars.get(name) {
        None => false,
        Some(v) => !v.is_empty() && v != "false" && v != "0",
    }
}

/// Resolve every `{{#if}}` block, innermost first, in a fixpoint loop capped
/// at [`MAX_CONDITIONAL_ITERATIONS`]. Returns `None` if a conditional block
/// still remains after the cap (non-termination guard — spec §4.5).
fn resolve_conditionals(template: &str, vars: &HashMap<String, String>) -> Option<String> {
    let mut text = template.to_string();
    for _ in 0..MAX_CONDITIONAL_ITERATIONS {
        if !IF_BLOCK.is_match(&text) {
            return Some(text);
        }
        text = IF_BLOCK
            .replace_all(&text, |caps: &regex::Captures| {
                let var = &caps[1];
                let body = &caps[2];
                let (then_branch, else_branch) = match body.split_once("{{else}}") {
                    Some((t, e)) => (t, Some(e)),
                    None => (body, None),
                };
                if is_truthy(vars, var) {
                    then_branch.to_string()
                } else {
                    else_branch.unwrap_or("").to_string()
                }
            })
            .into_owned();
    }
    if IF_BLOCK.is_match(&text) {
        None
    } else {
        Some(text)
    }
}

/// Substitute remaining `{{var}}` placeholders; missing variables render as
/// `[name]` and push a warning rather than failing.
fn substitute_variables(template: &str, vars: &HashMap<String, String>) -> (String, Vec<String>) {
    let mut warnings = Vec::new();
    let text = VAR_PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            match vars.get(name) {
                Some(v) => v.clone(),
                None => {
                    warnings.push(format!("missing template variable {name:?}"));
                    format!("[{name}]")
                }
            }
        })
        .into_owned();
    (text, warnings)
}

/// Render `template` against `vars`. Never fails: a conditional that cannot
/// be resolved within the iteration cap produces a [`RenderOutcome`] with
/// `used_fallback = true` and the caller-supplied fallback text.
#[must_use]
pub fn render(template: &str, vars: &HashMap<String, String>, fallback: &str) -> RenderOutcome {
    match resolve_conditionals(template, vars) {
        Some(resolved) => {
            let (text, warnings) = substitute_variables(&resolved, vars);
            RenderOutcome {
                text,
                warnings,
                used_fallback: false,
            }
        }
        None => RenderOutcome {
            text: fallback.to_string(),
            warnings: vec!["conditional resolution did not converge; used fallback".to_string()],
            used_fallback: true,
        },
    }
}

/// A deterministic fallback block naming the phase and the current status
/// counters (spec §4.5, §7 `TemplateRender`).
#[must_use]
pub fn fallback_block(phase: &str, tool_calls_total: u64, modification_count: u64, test_calls_count: u64) -> String {
    format!(
        "[guidance unavailable — template rendering failed]\n\
         phase: {phase}\n\
         tool_calls_total: {tool_calls_total}\n\
         modification_count: {modification_count}\n\
         test_calls_count: {test_calls_count}"
    )
}

const ANALYZE_TEMPLATE: &str = "You are in the ANALYZE phase for {{repo}}. Read the files relevant \
     to the issue and run the test suite at least once before making any modification.\
     {{#if has_run_tests}} Tests have been run {{tests_run_count}} time(s) so far.{{else}} No \
     tests have been run yet — run them before touching any file.{{/if}}\
     {{#if strict_exploration}} This repository requires thorough exploration: also read the \
     README and the test directory layout before modifying anything.{{/if}}";

const MODIFY_TEMPLATE: &str = "You are in the MODIFY phase for {{repo}}. {{modification_count}} \
     modification(s) made so far; modified files: {{modified_files}}.\
     {{#if tests_passed_after_modify}} The tests you ran after modifying passed.{{else}} Run the \
     tests again after this change to confirm the fix.{{/if}} {{remaining_commands}} more \
     execute_command call(s) are needed before VERIFY becomes available.";

const VERIFY_TEMPLATE: &str = "You are in the VERIFY phase for {{repo}}. Before calling \
     attempt_completion: inspect the diff, review behaviour/edge-case/regression impact, run \
     FAIL_TO_PASS then PASS_TO_PASS tests, and inspect the logs for unexpected warnings.\
     {{#if tests_passed_after_modify}} All observed test runs after modification have passed.\
     {{else}} Some test runs after modification have not yet passed — do not submit until they \
     do.{{/if}}";

/// Holds the default per-phase templates plus repository-keyed overrides
/// (spec §4.5: "default per phase, overridable per repository").
#[derive(Debug, Clone, Default)]
pub struct PromptGenerator {
    overrides: HashMap<(String, String), String>,
}

impl PromptGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a per-repository override for one phase's template.
    pub fn set_override(&mut self, repo: impl Into<String>, phase: impl Into<String>, template: impl Into<String>) {
        self.overrides.insert((repo.into(), phase.into()), template.into());
    }

    fn template_for(&self, phase: Phase, repo: &str) -> &str {
        if let Some(t) = self.overrides.get(&(repo.to_string(), phase.to_string())) {
            return t;
        }
        match phase {
            Phase::Analyze => ANALYZE_TEMPLATE,
            Phase::Modify => MODIFY_TEMPLATE,
            Phase::Verify => VERIFY_TEMPLATE,
        }
    }

    /// Render the guidance for `phase`/`repo`, falling back to
    /// [`fallback_block`] built from `vars`'s status counters on any
    /// rendering failure. A fallback is recorded as [`GovernorError::TemplateRender`]
    /// in the returned outcome's warnings (spec §7).
    #[must_use]
    pub fn render_phase_guidance(&self, phase: Phase, repo: &str, vars: &HashMap<String, String>) -> RenderOutcome {
        let template = self.template_for(phase, repo);
        let fallback = fallback_block(
            &phase.to_string(),
            vars.get("tool_calls_total").and_then(|v| v.parse().ok()).unwrap_or(0),
            vars.get("modification_count").and_then(|v| v.parse().ok()).unwrap_or(0),
            vars.get("test_calls_count").and_then(|v| v.parse().ok()).unwrap_or(0),
        );
        let mut out = render(template, vars, &fallback);
        if out.used_fallback {
            let err = GovernorError::TemplateRender {
                phase: phase.to_string(),
                reason: "conditional resolution did not converge".to_string(),
            };
            out.warnings.push(err.to_string());
        }
        out
    }
}
