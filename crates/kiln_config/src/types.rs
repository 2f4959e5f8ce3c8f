//! Configuration types deserialized from `kiln.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The top-level project configuration parsed from `kiln.toml`.
///
/// A project registers one or more build targets; each target gets its own
/// outbox, recompiler, and cache state at server start.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// The registered build targets, in declaration order.
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
}

impl ProjectConfig {
    /// Looks up a target configuration by name.
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// Registration for one build target.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// The target's unique name. Jobs are routed to outboxes by this name.
    pub name: String,
    /// Directory containing the target's `.ku` source units.
    pub source_dir: PathBuf,
    /// Directory containing resources read by generators, if any.
    #[serde(default)]
    pub resource_dir: Option<PathBuf>,
    /// Names of the target's entry (root) units. Units not transitively
    /// referenced from a root are never regenerated.
    pub roots: Vec<String>,
    /// Selected build-configuration properties. A change to this map voids
    /// the target's cache validity assumptions.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_lookup() {
        let config = ProjectConfig {
            targets: vec![TargetConfig {
                name: "web".to_string(),
                source_dir: PathBuf::from("src/web"),
                resource_dir: None,
                roots: vec!["main".to_string()],
                properties: BTreeMap::new(),
            }],
        };
        assert!(config.target("web").is_some());
        assert!(config.target("native").is_none());
    }
}
