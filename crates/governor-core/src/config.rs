use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

/// Path-mapping prefixes, overridable per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathMappingConfig {
    #[serde(default = "default_source_prefix")]
    pub source_prefix: String,
    #[serde(default = "default_target_prefix")]
    pub target_prefix: String,
}

impl Default for PathMappingConfig {
    fn default() -> Self {
        Self {
            source_prefix: default_source_prefix(),
            target_prefix: default_target_prefix(),
        }
    }
}

fn default_source_prefix() -> String {
    crate::DEFAULT_SOURCE_PREFIX.to_string()
}

fn default_target_prefix() -> String {
    crate::DEFAULT_TARGET_PREFIX.to_string()
}

/// Reasoning budget ceilings per phase. Overridable so a caller can tune
/// depth without recompiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_analyze_budget")]
    pub analyze_max: u32,
    #[serde(default = "default_modify_budget")]
    pub modify_max: u32,
    #[serde(default = "default_verify_budget")]
    pub verify_max: u32,
}

fn default_analyze_budget() -> u32 {
    16384
}
fn default_modify_budget() -> u32 {
    8192
}
fn default_verify_budget() -> u32 {
    16384
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            analyze_max: default_analyze_budget(),
            modify_max: default_modify_budget(),
            verify_max: default_verify_budget(),
        }
    }
}

/// Top-level configuration for the policy engine, loaded by layering a TOML
/// file over built-in defaults — the same merge-over-defaults shape as
/// `codingbuddy_core::AppConfig::load` uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernorConfig {
    #[serde(default)]
    pub path_mapping: PathMappingConfig,
    #[serde(default)]
    pub budgets: BudgetConfig,
    /// Per-instance-id repository overrides layered on top of the built-in
    /// registry table. A malformed override is dropped with a warning, not
    /// a hard failure.
    #[serde(default)]
    pub repository_overrides: std::collections::HashMap<String, String>,
}

impl GovernorConfig {
    /// Load from a TOML file at `path`, falling back to defaults for any
    /// field the file omits or if the file does not exist at all.
    pub fn load(path: &Path) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let overlay: GovernorConfig = toml::from_str(&raw)?;
            merge_json_value(&mut merged, &serde_json::to_value(overlay)?);
        }
        Ok(serde_json::from_value(merged)?)
    }
}

/// Recursively merge `overlay` onto `base`, object keys replacing leaf
/// values — the same settings-layering shape `codingbuddy_core::AppConfig`
/// uses for its own merge pass.
fn merge_json_value(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                merge_json_value(base_map.entry(key.clone()).or_insert(serde_json::Value::Null), value);
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_used_when_file_absent() {
        let cfg = GovernorConfig::load(Path::new("/nonexistent/governor.toml")).unwrap();
        assert_eq!(cfg.path_mapping.source_prefix, "/testbed");
        assert_eq!(cfg.budgets.modify_max, 8192);
    }

    #[test]
    fn file_overlay_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governor.toml");
        std::fs::write(&path, "[budgets]\nmodify_max = 4096\n").unwrap();
        let cfg = GovernorConfig::load(&path).unwrap();
        assert_eq!(cfg.budgets.modify_max, 4096);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.budgets.analyze_max, 16384);
        assert_eq!(cfg.path_mapping.source_prefix, "/testbed");
    }
}
