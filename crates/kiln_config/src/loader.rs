//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::collections::HashSet;
use std::path::Path;

/// Loads and validates a `kiln.toml` configuration from a project directory.
///
/// Reads `<project_dir>/kiln.toml`, parses it, and validates every target
/// registration.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join("kiln.toml");
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that target registrations are complete and mutually consistent.
pub fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for target in &config.targets {
        if target.name.is_empty() {
            return Err(ConfigError::MissingField("target.name".to_string()));
        }
        if !seen.insert(target.name.as_str()) {
            return Err(ConfigError::DuplicateTarget(target.name.clone()));
        }
        if target.source_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "target '{}' source_dir",
                target.name
            )));
        }
        if target.roots.is_empty() {
            return Err(ConfigError::NoRoots(target.name.clone()));
        }
    }
    Ok(())
}
