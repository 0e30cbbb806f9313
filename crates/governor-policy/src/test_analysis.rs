//! Test-Command Analyser (spec §4.3): classify commands/output, score
//! confidence, and track a bounded per-repository effectiveness history.

use governor_core::{GovernorError, RepositoryConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::LazyLock;

/// Max effectiveness-history entries kept per repository.
pub const MAX_EFFECTIVENESS_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    F2p,
    P2p,
    Discovery,
    Validation,
    Exploration,
    Unknown,
}

/// Framework-agnostic test-runner patterns, applied after repo-specific
/// patterns fail to match (spec §4.3).
static GENERIC_TEST_PATTERNS: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        r"\bpytest\b",
        r"python\s+-m\s+unittest\b",
        r"runtests\.py\b",
        r"\btox\b",
        r"\bnox\b",
        r"manage\.py\s+test\b",
        r"\bmake\s+test\b",
        r"\bgo\s+test\b",
        r"\bcargo\s+test\b",
        r"\bnpm\s+test\b",
    ]
    .iter()
    .map(|p| regex::Regex::new(p).unwrap())
    .collect()
});

static PURE_INSTALL: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^\s*pip\d?\s+install\b").unwrap());

static RUNTESTS_HELP: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"runtests\.py\s+(--help|-h|--version)\b").unwrap());

/// Split a shell command into `&&`/`;`/`||`-delimited segments, honoring
/// single/double quotes so separators inside a quoted string are not treated
/// as chaining.
#[must_use]
pub fn split_segments(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut prev = '\0';
    let chars: Vec<char> = command.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' if !in_double && prev != '\\' => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single && prev != '\\' => {
                in_double = !in_double;
                current.push(c);
            }
            ';' if !in_single && !in_double => {
                segments.push(std::mem::take(&mut current));
            }
            '&' if !in_single && !in_double && chars.get(i + 1) == Some(&'&') => {
                segments.push(std::mem::take(&mut current));
                i += 1;
            }
            '|' if !in_single && !in_double && chars.get(i + 1) == Some(&'|') => {
                segments.push(std::mem::take(&mut current));
                i += 1;
            }
            _ => current.push(c),
        }
        prev = c;
        i += 1;
    }
    segments.push(current);
    segments
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// True if `segment` looks like a test invocation, per spec §4.3: repo
/// patterns first, then the generic set; `pip install` is never a test
/// command, and `runtests.py --help/-h/--version` is explicitly excluded.
#[must_use]
pub fn is_test_command(segment: &str, repo: &RepositoryConfig) -> bool {
    if PURE_INSTALL.is_match(segment) {
        return false;
    }
    if RUNTESTS_HELP.is_match(segment) {
        return false;
    }
    for pat in &repo.test_patterns {
        if let Ok(re) = regex::Regex::new(pat)
            && re.is_match(segment)
        {
            return true;
        }
    }
    GENERIC_TEST_PATTERNS.iter().any(|re| re.is_match(segment))
}

/// True if any shell-separator-delimited segment of `command` is a test
/// command.
#[must_use]
pub fn contains_test_command(command: &str, repo: &RepositoryConfig) -> bool {
    split_segments(command)
        .iter()
        .any(|seg| is_test_command(seg, repo))
}

/// Classify a command, precedence: discovery > p2p > f2p > unknown.
#[must_use]
pub fn classify_command(command: &str, repo: &RepositoryConfig) -> CommandClass {
    if command.contains("--help") || command.contains("--collect-only") {
        return CommandClass::Discovery;
    }
    if repo
        .source_examples_hint
        .iter()
        .any(|ex| command_similar(command, ex))
    {
        return CommandClass::P2p;
    }
    if command.contains("test_") || command.contains("::test_") {
        return CommandClass::F2p;
    }
    if !contains_test_command(command, repo) {
        if command.trim_start().starts_with("pip")
            || command.contains("pip install")
        {
            return CommandClass::Exploration;
        }
        return CommandClass::Unknown;
    }
    CommandClass::Validation
}

/// `command` is equal, or similar by normalized string similarity, to one of
/// the repository's example invocations.
fn command_similar(command: &str, example: &str) -> bool {
    if command.trim() == example.trim() {
        return true;
    }
    strsim::normalized_levenshtein(command.trim(), example.trim()) >= 0.85
}

/// Confidence score in `[0, 1]` per spec §4.3's additive formula.
#[must_use]
pub fn confidence_score(command: &str, repo: &RepositoryConfig) -> f64 {
    let mut score = 0.0_f64;
    let generic_match = GENERIC_TEST_PATTERNS.iter().any(|re| re.is_match(command));
    let repo_match = repo.test_patterns.iter().any(|pat| {
        regex::Regex::new(pat)
            .map(|re| re.is_match(command))
            .unwrap_or(false)
    });
    if generic_match {
        score += 0.4;
    }
    if repo_match {
        score += 0.5;
    } else if generic_match {
        score += 0.2;
    }
    if !repo.test_runner.is_empty() && command.contains(repo.test_runner.as_str()) {
        score += 0.1;
    }
    score.min(1.0)
}

/// One command's full analysis: whether it is a test command, its class, and
/// the analyser's confidence in that classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandAnalysis {
    pub is_test_command: bool,
    pub class: CommandClass,
    pub confidence: f64,
}

/// Run the full classification pipeline on one command. Fails with
/// [`GovernorError::TestAnalysis`] on malformed input (spec §7) rather than
/// silently returning a meaningless `false`/`0.0` result.
pub fn analyze_command(command: &str, repo: &RepositoryConfig) -> Result<CommandAnalysis, GovernorError> {
    if command.trim().is_empty() {
        return Err(GovernorError::TestAnalysis {
            reason: "command is empty".to_string(),
        });
    }
    Ok(CommandAnalysis {
        is_test_command: contains_test_command(command, repo),
        class: classify_command(command, repo),
        confidence: confidence_score(command, repo),
    })
}

static SUCCESS_PATTERNS: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bpassed\b",
        r"\bOK\b",
        r"(?i)\b0\s+failed\b",
        r"(?i)\ball tests passed\b",
    ]
    .iter()
    .map(|p| regex::Regex::new(p).unwrap())
    .collect()
});

static FAILURE_PATTERNS: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [r"(?i)\bFAILED\b", r"(?i)\bERROR\b", r"(?i)\btraceback\b"]
        .iter()
        .map(|p| regex::Regex::new(p).unwrap())
        .collect()
});

static TEST_NAME_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?m)(?:^|\s)([\w./]+::test_\w+|\btest_\w+\b)").unwrap());

/// Analyse raw command output for success, per spec §4.3's framework-agnostic
/// heuristic: success patterns present and failure patterns absent.
#[must_use]
pub fn output_indicates_success(output: &str) -> bool {
    let has_failure = FAILURE_PATTERNS.iter().any(|re| re.is_match(output));
    let has_success = SUCCESS_PATTERNS.iter().any(|re| re.is_match(output));
    has_success && !has_failure
}

/// Extract test names mentioned in output (best-effort).
#[must_use]
pub fn extract_test_names(output: &str) -> Vec<String> {
    let mut names: Vec<String> = TEST_NAME_PATTERN
        .captures_iter(output)
        .map(|c| c[1].to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// One recorded test-command outcome, kept in the bounded effectiveness
/// history.
#[derive(Debug, Clone)]
pub struct EffectivenessEntry {
    pub class: CommandClass,
    pub confidence: f64,
    pub success: bool,
}

/// Tracks a bounded, per-repository effectiveness history (spec §4.3: last
/// 100 entries).
#[derive(Debug, Default)]
pub struct EffectivenessTracker {
    history: HashMap<String, VecDeque<EffectivenessEntry>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EffectivenessSummary {
    pub total: usize,
    pub successes: usize,
    pub mean_confidence: f64,
}

impl EffectivenessTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, repo: &str, entry: EffectivenessEntry) {
        let deque = self.history.entry(repo.to_string()).or_default();
        deque.push_back(entry);
        if deque.len() > MAX_EFFECTIVENESS_HISTORY {
            deque.pop_front();
        }
    }

    #[must_use]
    pub fn summary(&self, repo: &str) -> EffectivenessSummary {
        let Some(deque) = self.history.get(repo) else {
            return EffectivenessSummary::default();
        };
        let total = deque.len();
        if total == 0 {
            return EffectivenessSummary::default();
        }
        let successes = deque.iter().filter(|e| e.success).count();
        let mean_confidence = deque.iter().map(|e| e.confidence).sum::<f64>() / total as f64;
        EffectivenessSummary {
            total,
            successes,
            mean_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepositoryConfig {
        governor_core::RepositoryConfig::fallback()
    }

    #[test]
    fn splits_on_double_ampersand() {
        let segs = split_segments("pip install -e . && pytest tests/");
        assert_eq!(segs, vec!["pip install -e .", "pytest tests/"]);
    }

    #[test]
    fn splits_respecting_quotes() {
        let segs = split_segments(r#"echo "a && b" ; pytest"#);
        assert_eq!(segs, vec![r#"echo "a && b""#, "pytest"]);
    }

    #[test]
    fn pure_install_is_not_a_test_command() {
        assert!(!is_test_command("pip install -e .", &repo()));
    }

    #[test]
    fn runtests_help_excluded() {
        assert!(!is_test_command("./tests/runtests.py --help", &repo()));
    }

    #[test]
    fn pytest_detected_generically() {
        assert!(is_test_command("pytest tests/test_foo.py", &repo()));
    }

    #[test]
    fn discovery_precedence_over_f2p() {
        let class = classify_command("pytest --collect-only tests/test_foo.py::test_bar", &repo());
        assert_eq!(class, CommandClass::Discovery);
    }

    #[test]
    fn f2p_detected_by_test_marker() {
        let class = classify_command("pytest tests/test_foo.py::test_bar", &repo());
        assert_eq!(class, CommandClass::F2p);
    }

    #[test]
    fn confidence_clamped_to_one() {
        let mut r = repo();
        r.test_runner = "pytest".to_string();
        let score = confidence_score("pytest tests/test_foo.py", &r);
        assert!(score <= 1.0);
        assert!(score > 0.9);
    }

    #[test]
    fn success_requires_no_failure_markers() {
        assert!(output_indicates_success("5 passed in 1.2s"));
        assert!(!output_indicates_success("5 passed, 1 FAILED"));
        assert!(!output_indicates_success("ERROR: could not collect"));
    }

    #[test]
    fn analyze_command_rejects_empty_input() {
        let err = analyze_command("   ", &repo()).unwrap_err();
        assert!(matches!(err, GovernorError::TestAnalysis { .. }));
    }

    #[test]
    fn analyze_command_matches_individual_helpers() {
        let r = repo();
        let analysis = analyze_command("pytest tests/test_foo.py::test_bar", &r).unwrap();
        assert!(analysis.is_test_command);
        assert_eq!(analysis.class, CommandClass::F2p);
        assert_eq!(analysis.confidence, confidence_score("pytest tests/test_foo.py::test_bar", &r));
    }

    #[test]
    fn effectiveness_history_is_bounded() {
        let mut tracker = EffectivenessTracker::new();
        for i in 0..150 {
            tracker.record(
                "django/django",
                EffectivenessEntry {
                    class: CommandClass::Validation,
                    confidence: 0.5,
                    success: i % 2 == 0,
                },
            );
        }
        let summary = tracker.summary("django/django");
        assert_eq!(summary.total, MAX_EFFECTIVENESS_HISTORY);
    }
}
