//! The generator interface behind `gen` directives.

use crate::cache::{GeneratedUnitSnapshot, RuleId};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Why a generator run produced no result.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The generator does not know how to answer this query type.
    #[error("no binding for query type `{query_type}`: {reason}")]
    Unsupported {
        /// The query type that was asked for.
        query_type: String,
        /// Generator-provided explanation.
        reason: String,
    },
    /// A resource the generator requires is not in the build's resource set.
    #[error("required resource `{0}` is missing")]
    MissingResource(String),
    /// Any other generator-reported failure.
    #[error("{0}")]
    Failed(String),
}

/// Scratch state one generator run accumulates before its result is frozen.
///
/// The run sees the build's resources through [`read_resource`], which also
/// records the access so the caller can invalidate this query type when the
/// resource later changes.
///
/// [`read_resource`]: GenerateContext::read_resource
#[derive(Debug, Default)]
pub struct GenerateContext {
    resources: BTreeMap<String, String>,
    resources_read: BTreeSet<String>,
    pub(crate) units: BTreeMap<String, GeneratedUnitSnapshot>,
    pub(crate) artifacts: BTreeSet<String>,
    pub(crate) client_data: BTreeMap<String, Value>,
}

impl GenerateContext {
    /// Creates a context over the build's resource set (name to content).
    pub fn new(resources: BTreeMap<String, String>) -> Self {
        Self {
            resources,
            ..Self::default()
        }
    }

    /// Reads a resource by name, recording the access.
    pub fn read_resource(&mut self, name: &str) -> Option<&str> {
        if self.resources.contains_key(name) {
            self.resources_read.insert(name.to_owned());
        }
        self.resources.get(name).map(String::as_str)
    }

    /// Commits a generated unit under its declared type name.
    pub fn commit_unit(&mut self, type_name: impl Into<String>, source: impl Into<String>) {
        let snapshot = GeneratedUnitSnapshot::new(type_name, source);
        self.units.insert(snapshot.type_name.clone(), snapshot);
    }

    /// Commits a named non-unit artifact.
    pub fn commit_artifact(&mut self, name: impl Into<String>) {
        self.artifacts.insert(name.into());
    }

    /// Stores opaque bookkeeping the generator wants back on its next run.
    pub fn set_client_data(&mut self, key: impl Into<String>, value: Value) {
        self.client_data.insert(key.into(), value);
    }

    /// Resource names this run read so far.
    pub fn resources_read(&self) -> &BTreeSet<String> {
        &self.resources_read
    }

    /// Generated units committed so far, keyed by type name.
    pub fn units(&self) -> &BTreeMap<String, GeneratedUnitSnapshot> {
        &self.units
    }
}

/// A generation rule: answers rebind queries by emitting units and naming
/// the type to instantiate.
///
/// Implementations are registered once per rule name and shared read-only
/// across build targets, so they must be `Send + Sync`; per-run mutable
/// state lives in the [`GenerateContext`].
pub trait Generator: Send + Sync {
    /// A canonical, stable description of this rule. Two generators with the
    /// same description are treated as the same rule for caching.
    fn canonical_description(&self) -> String;

    /// Answers one query type, committing any generated units and artifacts
    /// into `context`, and returns the result type name.
    fn generate(
        &self,
        query_type: &str,
        context: &mut GenerateContext,
    ) -> Result<String, GenerateError>;

    /// This rule's cache identity.
    fn rule_id(&self) -> RuleId {
        RuleId::of(&self.canonical_description())
    }
}
