//! Per-target fingerprint and dependency bookkeeping.

use kiln_common::ContentHash;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// A compiled unit's cached output: lowered target text plus its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledOutput {
    /// The lowered target text.
    pub text: String,
    /// Strong hash of `text`.
    pub hash: ContentHash,
}

impl CompiledOutput {
    /// Freezes lowered text into a cached output record.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = ContentHash::from_str(&text);
        Self { text, hash }
    }
}

/// The result of one staleness computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleSet {
    /// Units that must be recompiled.
    pub units: BTreeSet<String>,
    /// Query types whose cached rebind results must not be reused.
    pub queries: BTreeSet<String>,
}

/// Everything one build target remembers between compiles in order to
/// decide "unchanged, reusable" versus "must regenerate".
///
/// The cache is `Clone` on purpose: a compile attempt works on a clone and
/// the clone replaces this instance only when the whole attempt succeeds,
/// so a failed attempt can never leave partial records behind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinimalRebuildCache {
    // Fingerprints of last committed inputs.
    content_hash_by_source_path: BTreeMap<PathBuf, ContentHash>,
    content_hash_by_resource: BTreeMap<String, ContentHash>,
    properties_hash: Option<ContentHash>,

    // Unit identity and dependency edges.
    unit_by_source_path: BTreeMap<PathBuf, String>,
    source_path_by_unit: BTreeMap<String, PathBuf>,
    references_out: BTreeMap<String, BTreeSet<String>>,
    references_in: BTreeMap<String, BTreeSet<String>>,
    root_units: BTreeSet<String>,

    // Cached compile products.
    output_by_unit: BTreeMap<String, CompiledOutput>,
    content_hash_by_generated_unit: BTreeMap<String, ContentHash>,

    // Rebind associations.
    rebinder_units_by_query: BTreeMap<String, BTreeSet<String>>,
    generated_units_by_query: BTreeMap<String, BTreeSet<String>>,
    resources_read_by_query: BTreeMap<String, BTreeSet<String>>,

    // Scratch from the most recent fingerprint diff, consumed by the next
    // staleness computation.
    modified_source_paths: BTreeSet<PathBuf>,
    deleted_source_paths: BTreeSet<PathBuf>,
    modified_resources: BTreeSet<String>,
    forced_stale_paths: BTreeSet<PathBuf>,

    // Retained for inspection after compute_stale_units.
    stale_units: BTreeSet<String>,
}

impl MinimalRebuildCache {
    /// Creates an empty, unpopulated cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this cache has committed at least one successful compile.
    pub fn is_populated(&self) -> bool {
        self.properties_hash.is_some()
    }

    /// Whether the given properties fingerprint differs from the committed
    /// one. True for an unpopulated cache.
    pub fn properties_changed(&self, hash: ContentHash) -> bool {
        self.properties_hash != Some(hash)
    }

    /// Commits the properties fingerprint; this is also what marks the
    /// cache populated.
    pub fn set_properties_hash(&mut self, hash: ContentHash) {
        self.properties_hash = Some(hash);
    }

    /// Test hook: forces a path into the next diff's modified set even if
    /// its fingerprint is unchanged.
    pub fn mark_source_stale(&mut self, path: impl Into<PathBuf>) {
        self.forced_stale_paths.insert(path.into());
    }

    /// Diffs a fresh source-directory scan against the committed
    /// fingerprints, recording modified and deleted paths.
    pub fn record_source_fingerprints(&mut self, scanned: &BTreeMap<PathBuf, ContentHash>) {
        self.modified_source_paths.clear();
        self.deleted_source_paths.clear();
        for (path, hash) in scanned {
            if self.content_hash_by_source_path.get(path) != Some(hash) {
                self.modified_source_paths.insert(path.clone());
            }
        }
        for path in std::mem::take(&mut self.forced_stale_paths) {
            if scanned.contains_key(&path) {
                self.modified_source_paths.insert(path);
            }
        }
        for path in self.content_hash_by_source_path.keys() {
            if !scanned.contains_key(path) {
                self.deleted_source_paths.insert(path.clone());
            }
        }
        self.content_hash_by_source_path = scanned.clone();
    }

    /// Diffs a fresh resource scan against the committed fingerprints.
    pub fn record_resource_fingerprints(&mut self, scanned: &BTreeMap<String, ContentHash>) {
        self.modified_resources.clear();
        for (name, hash) in scanned {
            if self.content_hash_by_resource.get(name) != Some(hash) {
                self.modified_resources.insert(name.clone());
            }
        }
        for name in self.content_hash_by_resource.keys() {
            if !scanned.contains_key(name) {
                self.modified_resources.insert(name.clone());
            }
        }
        self.content_hash_by_resource = scanned.clone();
    }

    /// Paths the last diff found modified (includes forced-stale paths).
    pub fn modified_source_paths(&self) -> &BTreeSet<PathBuf> {
        &self.modified_source_paths
    }

    /// Paths the last diff found deleted.
    pub fn deleted_source_paths(&self) -> &BTreeSet<PathBuf> {
        &self.deleted_source_paths
    }

    /// Associates a unit name with the source path it was parsed from.
    pub fn associate_unit(&mut self, unit: impl Into<String>, path: impl Into<PathBuf>) {
        let unit = unit.into();
        let path = path.into();
        self.unit_by_source_path.insert(path.clone(), unit.clone());
        self.source_path_by_unit.insert(unit, path);
    }

    /// The unit parsed from a source path, if any compile has seen it.
    pub fn unit_for_path(&self, path: &Path) -> Option<&str> {
        self.unit_by_source_path.get(path).map(String::as_str)
    }

    /// Replaces the configured root unit names.
    pub fn set_root_units(&mut self, roots: impl IntoIterator<Item = String>) {
        self.root_units = roots.into_iter().collect();
    }

    /// Replaces one unit's outgoing reference edges, keeping the reverse
    /// map consistent.
    pub fn set_unit_references(&mut self, unit: &str, references: BTreeSet<String>) {
        if let Some(old) = self.references_out.remove(unit) {
            for referenced in old {
                if let Some(referencers) = self.references_in.get_mut(&referenced) {
                    referencers.remove(unit);
                }
            }
        }
        for referenced in &references {
            self.references_in
                .entry(referenced.clone())
                .or_default()
                .insert(unit.to_owned());
        }
        self.references_out.insert(unit.to_owned(), references);
    }

    /// One unit's outgoing references, if it has compiled before.
    pub fn references_of(&self, unit: &str) -> Option<&BTreeSet<String>> {
        self.references_out.get(unit)
    }

    /// Units whose compiled form references `unit`.
    pub fn referencers_of(&self, unit: &str) -> Option<&BTreeSet<String>> {
        self.references_in.get(unit)
    }

    /// Caches a unit's lowered output.
    pub fn record_output(&mut self, unit: impl Into<String>, output: CompiledOutput) {
        self.output_by_unit.insert(unit.into(), output);
    }

    /// A unit's cached output, if still valid.
    pub fn output_of(&self, unit: &str) -> Option<&CompiledOutput> {
        self.output_by_unit.get(unit)
    }

    /// Records a generated unit's content hash; returns `true` if the
    /// content actually changed since the last generation. An unchanged
    /// regeneration must not dirty the unit's dependents.
    pub fn record_generated_unit(&mut self, unit: impl Into<String>, hash: ContentHash) -> bool {
        self.content_hash_by_generated_unit.insert(unit.into(), hash) != Some(hash)
    }

    /// Records that `unit` carries a `gen` directive for `query`.
    pub fn add_rebinder_unit(&mut self, query: impl Into<String>, unit: impl Into<String>) {
        self.rebinder_units_by_query
            .entry(query.into())
            .or_default()
            .insert(unit.into());
    }

    /// Replaces the set of units a query's generator emitted.
    pub fn set_generated_units_for_query(
        &mut self,
        query: impl Into<String>,
        units: BTreeSet<String>,
    ) {
        self.generated_units_by_query.insert(query.into(), units);
    }

    /// Replaces the set of resources a query's generator read.
    pub fn set_resources_for_query(
        &mut self,
        query: impl Into<String>,
        resources: BTreeSet<String>,
    ) {
        self.resources_read_by_query.insert(query.into(), resources);
    }

    /// Units the most recent staleness computation found stale.
    pub fn stale_units(&self) -> &BTreeSet<String> {
        &self.stale_units
    }

    /// Transitive closure from the root units over outgoing references.
    ///
    /// Units outside this set are never compiled or validated; a broken
    /// unit that nothing reachable references does not fail the build.
    pub fn compute_reachable_units(&self) -> BTreeSet<String> {
        let (graph, indices) = self.reference_graph();
        let mut reachable = BTreeSet::new();
        for root in &self.root_units {
            let Some(&start) = indices.get(root.as_str()) else {
                continue;
            };
            let mut bfs = Bfs::new(&graph, start);
            while let Some(node) = bfs.next(&graph) {
                reachable.insert(graph[node].clone());
            }
        }
        reachable
    }

    /// Computes the stale unit set from the most recent fingerprint diffs.
    ///
    /// Seeds with units whose sources changed or disappeared, folds in
    /// rebind-triggered staleness (queries that read a modified resource,
    /// queries whose own query type is a stale unit, and the rebinder and
    /// generated units of every stale query, iterated until no new stale
    /// query types appear), then closes over reverse references: anything
    /// that directly or indirectly references a stale unit is stale too.
    /// Records for deleted sources are purged as a side effect.
    pub fn compute_stale_units(&mut self) -> StaleSet {
        let mut units: BTreeSet<String> = BTreeSet::new();
        for path in &self.modified_source_paths {
            if let Some(unit) = self.unit_by_source_path.get(path) {
                units.insert(unit.clone());
            }
        }
        let deleted_units: BTreeSet<String> = self
            .deleted_source_paths
            .iter()
            .filter_map(|path| self.unit_by_source_path.get(path).cloned())
            .collect();
        units.extend(deleted_units.iter().cloned());

        let mut queries: BTreeSet<String> = self
            .resources_read_by_query
            .iter()
            .filter(|(_, read)| !read.is_disjoint(&self.modified_resources))
            .map(|(query, _)| query.clone())
            .collect();

        // Generated units of a stale query can themselves be query types or
        // carry further directives, so iterate until nothing new appears.
        loop {
            let mut grew = false;
            for query in self
                .generated_units_by_query
                .keys()
                .chain(self.rebinder_units_by_query.keys())
            {
                if units.contains(query) && queries.insert(query.clone()) {
                    grew = true;
                }
            }
            for query in &queries {
                for unit in self
                    .rebinder_units_by_query
                    .get(query)
                    .into_iter()
                    .chain(self.generated_units_by_query.get(query))
                    .flatten()
                {
                    if units.insert(unit.clone()) {
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
        }

        // Any referencer of a stale unit is stale: reverse-reachability
        // over the reference graph.
        let (graph, indices) = self.reference_graph();
        let reversed = Reversed(&graph);
        for seed in units.clone() {
            let Some(&start) = indices.get(seed.as_str()) else {
                continue;
            };
            let mut bfs = Bfs::new(reversed, start);
            while let Some(node) = bfs.next(reversed) {
                units.insert(graph[node].clone());
            }
        }

        for unit in &deleted_units {
            self.purge_unit(unit.clone());
        }

        self.stale_units = units.clone();
        StaleSet { units, queries }
    }

    fn purge_unit(&mut self, unit: String) {
        if let Some(path) = self.source_path_by_unit.remove(&unit) {
            self.unit_by_source_path.remove(&path);
        }
        self.output_by_unit.remove(&unit);
        self.set_unit_references(&unit, BTreeSet::new());
        self.references_out.remove(&unit);
    }

    /// Drops a stale unit's cached output so a failed regeneration cannot
    /// be confused with a still-valid one.
    pub fn clear_output(&mut self, unit: &str) {
        self.output_by_unit.remove(unit);
    }

    /// The unit reference graph as a transient petgraph, plus a name index.
    fn reference_graph(&self) -> (DiGraph<String, ()>, BTreeMap<&str, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut indices: BTreeMap<&str, NodeIndex> = BTreeMap::new();
        // Two passes: allocate every node first, then add edges.
        let mut names: BTreeSet<&str> = BTreeSet::new();
        names.extend(self.root_units.iter().map(String::as_str));
        names.extend(self.source_path_by_unit.keys().map(String::as_str));
        for (unit, references) in &self.references_out {
            names.insert(unit);
            names.extend(references.iter().map(String::as_str));
        }
        for generated in self.generated_units_by_query.values().flatten() {
            names.insert(generated);
        }
        for name in names {
            let index = graph.add_node(name.to_owned());
            indices.insert(name, index);
        }
        for (unit, references) in &self.references_out {
            let from = indices[unit.as_str()];
            for referenced in references {
                graph.add_edge(from, indices[referenced.as_str()], ());
            }
        }
        (graph, indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn scan(entries: &[(&str, &str)]) -> BTreeMap<PathBuf, ContentHash> {
        entries
            .iter()
            .map(|(path, content)| (PathBuf::from(path), ContentHash::from_str(content)))
            .collect()
    }

    /// A three-unit chain main -> util -> leaf with fingerprints committed.
    fn chain_cache() -> MinimalRebuildCache {
        let mut cache = MinimalRebuildCache::new();
        cache.set_root_units(vec!["main".to_owned()]);
        cache.record_source_fingerprints(&scan(&[
            ("src/main.ku", "v1 main"),
            ("src/util.ku", "v1 util"),
            ("src/leaf.ku", "v1 leaf"),
        ]));
        cache.associate_unit("main", "src/main.ku");
        cache.associate_unit("util", "src/util.ku");
        cache.associate_unit("leaf", "src/leaf.ku");
        cache.set_unit_references("main", refs(&["util"]));
        cache.set_unit_references("util", refs(&["leaf"]));
        cache.set_unit_references("leaf", refs(&[]));
        cache.set_properties_hash(ContentHash::from_str("props"));
        cache
    }

    #[test]
    fn diff_reports_only_changed_paths() {
        let mut cache = chain_cache();
        cache.record_source_fingerprints(&scan(&[
            ("src/main.ku", "v1 main"),
            ("src/util.ku", "v2 util"),
            ("src/leaf.ku", "v1 leaf"),
        ]));
        assert_eq!(
            cache.modified_source_paths().iter().collect::<Vec<_>>(),
            vec![&PathBuf::from("src/util.ku")]
        );
        assert!(cache.deleted_source_paths().is_empty());
    }

    #[test]
    fn forced_stale_path_counts_as_modified() {
        let mut cache = chain_cache();
        cache.mark_source_stale("src/leaf.ku");
        cache.record_source_fingerprints(&scan(&[
            ("src/main.ku", "v1 main"),
            ("src/util.ku", "v1 util"),
            ("src/leaf.ku", "v1 leaf"),
        ]));
        assert!(cache
            .modified_source_paths()
            .contains(&PathBuf::from("src/leaf.ku")));
    }

    #[test]
    fn deleted_path_is_reported_and_purged() {
        let mut cache = chain_cache();
        cache.record_source_fingerprints(&scan(&[
            ("src/main.ku", "v1 main"),
            ("src/util.ku", "v1 util"),
        ]));
        assert!(cache
            .deleted_source_paths()
            .contains(&PathBuf::from("src/leaf.ku")));

        let stale = cache.compute_stale_units();
        // util references leaf, main references util.
        assert!(stale.units.contains("util"));
        assert!(stale.units.contains("main"));
        assert!(cache.unit_for_path(Path::new("src/leaf.ku")).is_none());
    }

    #[test]
    fn staleness_closes_over_reverse_references() {
        let mut cache = chain_cache();
        cache.record_source_fingerprints(&scan(&[
            ("src/main.ku", "v1 main"),
            ("src/util.ku", "v1 util"),
            ("src/leaf.ku", "v2 leaf"),
        ]));
        let stale = cache.compute_stale_units();
        assert_eq!(stale.units, refs(&["leaf", "main", "util"]));
        assert_eq!(cache.stale_units(), &refs(&["leaf", "main", "util"]));
    }

    #[test]
    fn untouched_cache_computes_no_staleness() {
        let mut cache = chain_cache();
        cache.record_source_fingerprints(&scan(&[
            ("src/main.ku", "v1 main"),
            ("src/util.ku", "v1 util"),
            ("src/leaf.ku", "v1 leaf"),
        ]));
        let stale = cache.compute_stale_units();
        assert!(stale.units.is_empty());
        assert!(stale.queries.is_empty());
    }

    #[test]
    fn reachability_ignores_unrooted_units() {
        let mut cache = chain_cache();
        cache.associate_unit("orphan", "src/orphan.ku");
        cache.set_unit_references("orphan", refs(&["missing"]));
        let reachable = cache.compute_reachable_units();
        assert_eq!(reachable, refs(&["leaf", "main", "util"]));
    }

    #[test]
    fn modified_resource_stales_query_rebinders_and_generated_units() {
        let mut cache = chain_cache();
        cache.add_rebinder_unit("Widget", "util");
        cache.set_generated_units_for_query("Widget", refs(&["widget_impl"]));
        cache.set_resources_for_query("Widget", refs(&["impl.suffix"]));
        cache.record_resource_fingerprints(
            &[("impl.suffix".to_owned(), ContentHash::from_str("v1"))]
                .into_iter()
                .collect(),
        );
        // Second scan with changed content.
        cache.record_resource_fingerprints(
            &[("impl.suffix".to_owned(), ContentHash::from_str("v2"))]
                .into_iter()
                .collect(),
        );
        cache.record_source_fingerprints(&scan(&[
            ("src/main.ku", "v1 main"),
            ("src/util.ku", "v1 util"),
            ("src/leaf.ku", "v1 leaf"),
        ]));

        let stale = cache.compute_stale_units();
        assert!(stale.queries.contains("Widget"));
        assert!(stale.units.contains("util"));
        assert!(stale.units.contains("widget_impl"));
        // main references util, so the closure pulls it in too.
        assert!(stale.units.contains("main"));
    }

    #[test]
    fn stale_query_type_unit_iterates_to_new_queries() {
        let mut cache = chain_cache();
        // leaf is itself a query type with generated units.
        cache.set_generated_units_for_query("leaf", refs(&["leaf_impl"]));
        cache.record_source_fingerprints(&scan(&[
            ("src/main.ku", "v1 main"),
            ("src/util.ku", "v1 util"),
            ("src/leaf.ku", "v2 leaf"),
        ]));
        let stale = cache.compute_stale_units();
        assert!(stale.queries.contains("leaf"));
        assert!(stale.units.contains("leaf_impl"));
    }

    #[test]
    fn unchanged_regeneration_is_not_a_content_change() {
        let mut cache = MinimalRebuildCache::new();
        let hash = ContentHash::from_str("unit gen\nret\n");
        assert!(cache.record_generated_unit("gen", hash));
        assert!(!cache.record_generated_unit("gen", hash));
        assert!(cache.record_generated_unit("gen", ContentHash::from_str("unit gen\n")));
    }

    #[test]
    fn reference_replacement_keeps_reverse_map_consistent() {
        let mut cache = chain_cache();
        cache.set_unit_references("main", refs(&["leaf"]));
        cache.record_source_fingerprints(&scan(&[
            ("src/main.ku", "v1 main"),
            ("src/util.ku", "v2 util"),
            ("src/leaf.ku", "v1 leaf"),
        ]));
        let stale = cache.compute_stale_units();
        // main no longer references util, so only util itself is stale.
        assert_eq!(stale.units, refs(&["util"]));
    }
}
