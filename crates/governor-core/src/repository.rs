use serde::{Deserialize, Serialize};

/// How a repository's test suite is organised — drives which pattern family
/// the Test-Command Analyser tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Django,
    Pytest,
    Tox,
    Custom,
}

/// Repository-specific configuration, immutable once loaded (spec §3).
/// Produced by the registry in `governor-policy::repository`; the type lives
/// here so `governor-prompts` and `governor-context` can reference it
/// without depending on the registry's lookup logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub repo: String,
    pub project_type: ProjectType,
    pub test_runner: String,
    /// Example test-runner invocations used for p2p similarity scoring and
    /// for rendering prompt guidance (spec §3's `examples` field).
    pub source_examples_hint: Vec<String>,
    pub test_patterns: Vec<String>,
    pub min_read_calls: usize,
    pub min_test_calls: usize,
    pub strict_exploration: bool,
}

impl RepositoryConfig {
    /// The generic fallback used for unknown repositories (spec §4.2).
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            repo: String::new(),
            project_type: ProjectType::Custom,
            test_runner: "auto-detect".to_string(),
            source_examples_hint: Vec::new(),
            test_patterns: vec![
                r"pytest\b".to_string(),
                r"python\s+-m\s+unittest\b".to_string(),
                r"\bmake\s+test\b".to_string(),
            ],
            min_read_calls: 3,
            min_test_calls: 1,
            strict_exploration: false,
        }
    }

    /// Warn (never fail) when required fields look unset. Returns the list
    /// of warnings; the config is always usable regardless.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.test_runner.is_empty() {
            warnings.push(format!("repository {:?} has no test_runner set", self.repo));
        }
        if self.test_patterns.is_empty() {
            warnings.push(format!(
                "repository {:?} has no test_patterns set",
                self.repo
            ));
        }
        warnings
    }
}
