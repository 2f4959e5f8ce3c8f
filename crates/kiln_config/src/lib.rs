//! Parsing and validation of `kiln.toml` build-target registration files.
//!
//! This crate reads the project configuration and produces a strongly-typed
//! [`ProjectConfig`] listing every build target the server should own.
//! Malformed registrations are rejected here, before any outbox is created.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, validate_config};
pub use types::{ProjectConfig, TargetConfig};
