//! Engine configuration
//!
//! Loaded from YAML; every key is optional.
//!
//! ```yaml
//! max_depth: 64
//! max_reference_depth: 128
//! recompute: lazy
//! ```

use crate::error::DocumentResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// When dirty fields get recomputed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecomputePolicy {
    /// `update_value` recomputes every invalidated field before returning
    #[default]
    Eager,
    /// `update_value` only invalidates; values are computed when read
    Lazy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum expression nesting, checked by the parser and the evaluator
    pub max_depth: usize,
    /// Maximum chain of formula fields evaluated inside one another
    pub max_reference_depth: usize,
    pub recompute: RecomputePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_reference_depth: 128,
            recompute: RecomputePolicy::Eager,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> DocumentResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> DocumentResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = EngineConfig::from_yaml_str("recompute: lazy\n").unwrap();
        assert_eq!(
            config,
            EngineConfig {
                recompute: RecomputePolicy::Lazy,
                ..EngineConfig::default()
            }
        );
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(EngineConfig::from_yaml_str("recompute: sometimes\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "max_depth: 8\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.max_depth, 8);
        assert_eq!(config.max_reference_depth, 128);
    }
}
