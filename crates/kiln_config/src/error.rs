//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating a `kiln.toml` configuration.
///
/// All of these surface before any outbox is created; a project with a
/// malformed target registration never accepts jobs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Two targets were registered under the same name.
    #[error("duplicate target name '{0}'")]
    DuplicateTarget(String),

    /// A target declared no root units.
    #[error("target '{0}' declares no root units")]
    NoRoots(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_duplicate_target() {
        let err = ConfigError::DuplicateTarget("web".to_string());
        assert_eq!(format!("{err}"), "duplicate target name 'web'");
    }

    #[test]
    fn display_missing_field() {
        let err = ConfigError::MissingField("target.name".to_string());
        assert_eq!(format!("{err}"), "missing required field: target.name");
    }

    #[test]
    fn display_no_roots() {
        let err = ConfigError::NoRoots("web".to_string());
        assert_eq!(format!("{err}"), "target 'web' declares no root units");
    }
}
