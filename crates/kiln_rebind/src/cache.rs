//! The two-level rebind result cache.

use crate::generator::GenerateContext;
use kiln_common::ContentHash;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of a generation rule, derived from its canonical description.
///
/// Two rules with the same canonical description are the same rule; the
/// description is hashed so the ID is cheap to compare and map-key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub ContentHash);

impl RuleId {
    /// Derives the rule ID from a canonical description string.
    pub fn of(canonical_description: &str) -> Self {
        RuleId(ContentHash::from_str(canonical_description))
    }
}

/// One unit emitted by a generator run, frozen at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedUnitSnapshot {
    /// The type name the generated unit declares.
    pub type_name: String,
    /// The full generated source text.
    pub source: String,
    /// Strong hash of `source`, used for content-identity checks when a
    /// unit is regenerated.
    pub content_hash: ContentHash,
}

impl GeneratedUnitSnapshot {
    /// Freezes a generated source under its declared type name.
    pub fn new(type_name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let content_hash = ContentHash::from_str(&source);
        Self {
            type_name: type_name.into(),
            source,
            content_hash,
        }
    }
}

/// Everything one generator run produced for one query type.
///
/// Immutable once built: regeneration replaces the whole result, never
/// edits it in place, so an `Arc` handed out by [`RebindCache::get`] stays
/// valid regardless of later cache activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRebindResult {
    /// The answer to the rebind query: the type to instantiate.
    pub result_type_name: String,
    /// Names of non-unit artifacts the run committed.
    pub artifacts: BTreeSet<String>,
    /// Generated units keyed by type name.
    pub generated_units: BTreeMap<String, GeneratedUnitSnapshot>,
    /// Wall-clock creation time, milliseconds since the Unix epoch.
    pub created_at_millis: u64,
    /// Opaque per-generator bookkeeping carried between runs.
    pub client_data: BTreeMap<String, serde_json::Value>,
}

impl CachedRebindResult {
    /// Freezes a finished generator run into an immutable result.
    pub fn from_context(result_type_name: impl Into<String>, context: GenerateContext) -> Self {
        let created_at_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            result_type_name: result_type_name.into(),
            artifacts: context.artifacts,
            generated_units: context.units,
            created_at_millis,
            client_data: context.client_data,
        }
    }
}

/// Two-level map from generation rule to query type to cached result.
///
/// Cloning is cheap: results are shared by `Arc`, and the clone diverges
/// from the original only through `put`/`invalidate` on either copy. This
/// is what lets a compile attempt work on a disposable copy and commit it
/// only on success.
#[derive(Debug, Clone, Default)]
pub struct RebindCache {
    results: BTreeMap<RuleId, BTreeMap<String, Arc<CachedRebindResult>>>,
}

impl RebindCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the cached result for a rule/query pair.
    ///
    /// Absence does not distinguish "never generated" from "invalidated";
    /// either way the caller must run the generator.
    pub fn get(&self, rule: RuleId, query_type: &str) -> Option<Arc<CachedRebindResult>> {
        self.results.get(&rule)?.get(query_type).cloned()
    }

    /// Inserts or overwrites the result for a rule/query pair.
    pub fn put(&mut self, rule: RuleId, query_type: impl Into<String>, result: CachedRebindResult) {
        self.results
            .entry(rule)
            .or_default()
            .insert(query_type.into(), Arc::new(result));
    }

    /// Drops every cached result. There is no selective invalidation; the
    /// staleness logic upstream decides when reuse is allowed instead.
    pub fn invalidate(&mut self) {
        self.results.clear();
    }

    /// Total number of cached rule/query entries.
    pub fn len(&self) -> usize {
        self.results.values().map(BTreeMap::len).sum()
    }

    /// Whether the cache holds no results at all.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
