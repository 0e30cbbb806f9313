//! Repository Registry (spec §4.2): maps a SWE-bench instance id to a
//! [`RepositoryConfig`], via a compile-time table — the same preference for
//! `static` constant tables over runtime-loaded data as
//! `codingbuddy-agent::agent_profiles::AgentProfile`.

use std::collections::HashMap;

use governor_core::{GovernorError, ProjectType, RepositoryConfig};

/// Extract `"django/django"` from `"django__django-12325"`: split on the
/// first double-underscore, rejoin with `/`, then drop the numeric suffix
/// after the final hyphen.
#[must_use]
pub fn repo_key_from_instance_id(instance_id: &str) -> String {
    let (org, rest) = match instance_id.split_once("__") {
        Some((org, rest)) => (org, rest),
        None => return instance_id.to_string(),
    };
    let repo_part = match rest.rfind('-') {
        Some(idx) if rest[idx + 1..].chars().all(|c| c.is_ascii_digit()) && idx + 1 < rest.len() => {
            &rest[..idx]
        }
        _ => rest,
    };
    format!("{org}/{repo_part}")
}

fn known_repo(repo: &str) -> Option<RepositoryConfig> {
    let cfg = match repo {
        "django/django" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Django,
            test_runner: "./tests/runtests.py".to_string(),
            source_examples_hint: vec![
                "./tests/runtests.py --parallel 1 queryset_pickle".to_string(),
                "./tests/runtests.py migrations".to_string(),
            ],
            test_patterns: vec![
                r"runtests\.py\b".to_string(),
                r"manage\.py\s+test\b".to_string(),
            ],
            min_read_calls: 4,
            min_test_calls: 1,
            strict_exploration: true,
        },
        "astropy/astropy" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Pytest,
            test_runner: "pytest".to_string(),
            source_examples_hint: vec!["pytest astropy/io/fits/tests".to_string()],
            test_patterns: vec![r"pytest\b".to_string()],
            min_read_calls: 3,
            min_test_calls: 1,
            strict_exploration: false,
        },
        "scikit-learn/scikit-learn" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Pytest,
            test_runner: "pytest".to_string(),
            source_examples_hint: vec!["pytest sklearn/linear_model/tests".to_string()],
            test_patterns: vec![r"pytest\b".to_string()],
            min_read_calls: 3,
            min_test_calls: 1,
            strict_exploration: false,
        },
        "sympy/sympy" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Pytest,
            test_runner: "bin/test".to_string(),
            source_examples_hint: vec!["bin/test sympy/core/tests/test_basic.py".to_string()],
            test_patterns: vec![r"bin/test\b".to_string(), r"pytest\b".to_string()],
            min_read_calls: 3,
            min_test_calls: 1,
            strict_exploration: false,
        },
        "matplotlib/matplotlib" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Pytest,
            test_runner: "pytest".to_string(),
            source_examples_hint: vec!["pytest lib/matplotlib/tests".to_string()],
            test_patterns: vec![r"pytest\b".to_string()],
            min_read_calls: 3,
            min_test_calls: 1,
            strict_exploration: false,
        },
        "pytest-dev/pytest" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Pytest,
            test_runner: "pytest".to_string(),
            source_examples_hint: vec!["pytest testing/test_config.py".to_string()],
            test_patterns: vec![r"pytest\b".to_string()],
            min_read_calls: 3,
            min_test_calls: 1,
            strict_exploration: false,
        },
        "pylint-dev/pylint" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Pytest,
            test_runner: "pytest".to_string(),
            source_examples_hint: vec!["pytest tests/test_self.py".to_string()],
            test_patterns: vec![r"pytest\b".to_string()],
            min_read_calls: 3,
            min_test_calls: 1,
            strict_exploration: false,
        },
        "psf/requests" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Pytest,
            test_runner: "pytest".to_string(),
            source_examples_hint: vec!["pytest tests/test_requests.py".to_string()],
            test_patterns: vec![r"pytest\b".to_string()],
            min_read_calls: 2,
            min_test_calls: 1,
            strict_exploration: false,
        },
        "pallets/flask" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Pytest,
            test_runner: "pytest".to_string(),
            source_examples_hint: vec!["pytest tests/test_basic.py".to_string()],
            test_patterns: vec![r"pytest\b".to_string()],
            min_read_calls: 2,
            min_test_calls: 1,
            strict_exploration: false,
        },
        "sphinx-doc/sphinx" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Tox,
            test_runner: "tox -e py39".to_string(),
            source_examples_hint: vec!["tox -e py39 -- tests/test_build_html.py".to_string()],
            test_patterns: vec![r"tox\b".to_string(), r"pytest\b".to_string()],
            min_read_calls: 3,
            min_test_calls: 1,
            strict_exploration: true,
        },
        "pydata/xarray" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Pytest,
            test_runner: "pytest".to_string(),
            source_examples_hint: vec!["pytest xarray/tests/test_dataset.py".to_string()],
            test_patterns: vec![r"pytest\b".to_string()],
            min_read_calls: 3,
            min_test_calls: 1,
            strict_exploration: false,
        },
        "mwaskom/seaborn" => RepositoryConfig {
            repo: repo.to_string(),
            project_type: ProjectType::Pytest,
            test_runner: "pytest".to_string(),
            source_examples_hint: vec!["pytest tests/test_relational.py".to_string()],
            test_patterns: vec![r"pytest\b".to_string()],
            min_read_calls: 2,
            min_test_calls: 1,
            strict_exploration: false,
        },
        _ => return None,
    };
    Some(cfg)
}

/// The registry's main entry point: always returns a usable config, logging
/// a warning (never failing) for unknown repositories.
#[must_use]
pub fn get_repository_config(instance_id: &str) -> (RepositoryConfig, Vec<String>) {
    let key = repo_key_from_instance_id(instance_id);
    match known_repo(&key) {
        Some(cfg) => {
            let warnings = cfg.validate();
            (cfg, warnings)
        }
        None => {
            let mut cfg = RepositoryConfig::fallback();
            cfg.repo = key.clone();
            let err = GovernorError::RepositoryConfig {
                instance_id: instance_id.to_string(),
            };
            (cfg, vec![err.to_string()])
        }
    }
}

/// Same as [`get_repository_config`], but layers `overrides` (keyed by raw
/// instance id, e.g. `GovernorConfig::repository_overrides`) over the
/// resolved test runner. An override that is blank is dropped with a
/// warning rather than producing an unusable config.
#[must_use]
pub fn get_repository_config_with_overrides(
    instance_id: &str,
    overrides: &HashMap<String, String>,
) -> (RepositoryConfig, Vec<String>) {
    let (mut cfg, mut warnings) = get_repository_config(instance_id);
    if let Some(override_runner) = overrides.get(instance_id) {
        if override_runner.trim().is_empty() {
            warnings.push(format!(
                "repository override for {instance_id:?} is blank; ignoring and keeping {:?}",
                cfg.test_runner
            ));
        } else {
            cfg.test_runner = override_runner.clone();
        }
    }
    (cfg, warnings)
}
