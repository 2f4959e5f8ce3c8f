//! The per-target recompiler: minimal rebuild with atomic cache commit.

use crate::cache::{CompiledOutput, MinimalRebuildCache, StaleSet};
use crate::frontend::Frontend;
use crate::manager::TargetState;
use kiln_cfg::build_cfg;
use kiln_common::ContentHash;
use kiln_config::TargetConfig;
use kiln_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink};
use kiln_flow::{solve_and_transform, UnreachableAnalysis};
use kiln_rebind::{CachedRebindResult, GenerateContext, GeneratedUnitSnapshot, Generator, RebindCache};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scanning the source or resource directory failed.
pub const SCAN_FAILED: DiagnosticCode = DiagnosticCode {
    category: Category::Rebuild,
    number: 101,
};
/// A unit's declared name does not match its file stem.
pub const UNIT_NAME_MISMATCH: DiagnosticCode = DiagnosticCode {
    category: Category::Error,
    number: 201,
};
/// A referenced unit exists neither on disk nor among generated units.
pub const UNRESOLVED_REFERENCE: DiagnosticCode = DiagnosticCode {
    category: Category::Error,
    number: 202,
};
/// A `gen` directive names a rule no registered generator answers to.
pub const UNKNOWN_RULE: DiagnosticCode = DiagnosticCode {
    category: Category::Generator,
    number: 301,
};
/// A generator ran and reported failure.
pub const GENERATOR_FAILED: DiagnosticCode = DiagnosticCode {
    category: Category::Generator,
    number: 302,
};
/// An internal invariant was violated; this is a kiln bug, not bad input.
pub const INTERNAL_ERROR: DiagnosticCode = DiagnosticCode {
    category: Category::Internal,
    number: 901,
};

/// Rule-name to generator bindings, shared read-only across targets.
#[derive(Default)]
pub struct GeneratorRegistry {
    by_rule: BTreeMap<String, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a rule name to a generator, replacing any previous binding.
    pub fn register(&mut self, rule: impl Into<String>, generator: Arc<dyn Generator>) {
        self.by_rule.insert(rule.into(), generator);
    }

    /// Looks up the generator bound to a rule name.
    pub fn get(&self, rule: &str) -> Option<&Arc<dyn Generator>> {
        self.by_rule.get(rule)
    }
}

/// What one compile attempt produced.
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    /// Whether the attempt succeeded and its caches were committed.
    pub ok: bool,
    /// Units the attempt considered stale.
    pub stale_units: BTreeSet<String>,
    /// Units the attempt actually recompiled (a subset of the stale and
    /// newly discovered units that are reachable from the roots).
    pub compiled_units: BTreeSet<String>,
    /// Diagnostics accumulated during the attempt.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutcome {
    /// Whether the attempt succeeded.
    pub fn is_ok(&self) -> bool {
        self.ok
    }
}

/// Recompiles one build target with minimal rebuilds and atomic commit.
///
/// The recompiler owns its target's known-good caches for as long as it
/// lives (taken from the [`RebuildCacheManager`] at startup, returned at
/// shutdown). Every [`compile`] call works on clones of those caches and
/// replaces the known-good state only when the whole attempt succeeds, so a
/// failed attempt — even one in which some units individually compiled —
/// leaves the known-good state exactly as it was.
///
/// [`RebuildCacheManager`]: crate::manager::RebuildCacheManager
/// [`compile`]: Recompiler::compile
pub struct Recompiler {
    target: TargetConfig,
    frontend: Arc<dyn Frontend>,
    generators: Arc<GeneratorRegistry>,
    state: TargetState,
}

/// Outcome of visiting one unit inside an attempt.
enum Visit {
    Done,
    /// No source was available yet; the unit may be produced by a
    /// generator that has not run this pass.
    NoSource,
}

/// Marker: the attempt failed and its diagnostics are already in the sink.
struct Halt;

impl Recompiler {
    /// Creates a recompiler over a target's known-good cache state.
    pub fn new(
        target: TargetConfig,
        state: TargetState,
        frontend: Arc<dyn Frontend>,
        generators: Arc<GeneratorRegistry>,
    ) -> Self {
        Self {
            target,
            frontend,
            generators,
            state,
        }
    }

    /// The name of the target this recompiler serves.
    pub fn target_name(&self) -> &str {
        &self.target.name
    }

    /// Hands the known-good cache state back, consuming the recompiler.
    pub fn into_state(self) -> TargetState {
        self.state
    }

    /// Test hook: forces a source path into the next attempt's modified set.
    pub fn mark_source_stale(&mut self, path: impl Into<PathBuf>) {
        self.state.rebuild.mark_source_stale(path);
    }

    /// A unit's committed lowered output, if the last successful attempt
    /// produced or kept one.
    pub fn output_of(&self, unit: &str) -> Option<&str> {
        self.state
            .rebuild
            .output_of(unit)
            .map(|output| output.text.as_str())
    }

    /// Runs one compile attempt.
    ///
    /// `changed_inputs` is advisory: listed paths are forced stale, but the
    /// attempt fingerprints the whole source and resource tree regardless,
    /// so an empty list is always safe.
    pub fn compile(&mut self, changed_inputs: &[PathBuf], sink: &DiagnosticSink) -> CompileOutcome {
        let mut attempt = match self.begin_attempt(changed_inputs, sink) {
            Ok(attempt) => attempt,
            Err(Halt) => return failed_outcome(sink, StaleSet::default(), BTreeSet::new()),
        };
        match attempt.run() {
            Ok(()) => {
                // Commit: the working copies become the known-good state.
                self.state.rebuild = attempt.rebuild;
                self.state.rebind = attempt.rebind;
                CompileOutcome {
                    ok: true,
                    stale_units: attempt.stale.units,
                    compiled_units: attempt.compiled,
                    diagnostics: sink.diagnostics(),
                }
            }
            // Working copies are dropped; known-good state is untouched.
            Err(Halt) => failed_outcome(sink, attempt.stale, attempt.compiled),
        }
    }

    /// Fingerprints the target's inputs into working cache copies and
    /// computes the stale set.
    fn begin_attempt<'a>(
        &self,
        changed_inputs: &[PathBuf],
        sink: &'a DiagnosticSink,
    ) -> Result<Attempt<'a>, Halt> {
        let mut rebuild = self.state.rebuild.clone();
        let mut rebind = self.state.rebind.clone();

        let sources = scan_sources(&self.target.source_dir).map_err(|err| {
            sink.emit(Diagnostic::error(
                SCAN_FAILED,
                format!(
                    "failed to scan source directory `{}`: {err}",
                    self.target.source_dir.display()
                ),
            ));
            Halt
        })?;
        let resources = match &self.target.resource_dir {
            Some(dir) => scan_resources(dir).map_err(|err| {
                sink.emit(Diagnostic::error(
                    SCAN_FAILED,
                    format!("failed to scan resource directory `{}`: {err}", dir.display()),
                ));
                Halt
            })?,
            None => BTreeMap::new(),
        };

        let properties_hash = hash_properties(&self.target.properties);
        if !rebuild.is_populated() || rebuild.properties_changed(properties_hash) {
            // The cache's validity assumptions are void: start the rebuild
            // bookkeeping over and drop every cached rebind result.
            rebuild = MinimalRebuildCache::new();
            rebind.invalidate();
        }

        for path in changed_inputs {
            rebuild.mark_source_stale(path);
        }

        let source_fingerprints: BTreeMap<PathBuf, ContentHash> = sources
            .iter()
            .map(|(path, content)| (path.clone(), ContentHash::from_str(content)))
            .collect();
        rebuild.record_source_fingerprints(&source_fingerprints);
        let resource_fingerprints: BTreeMap<String, ContentHash> = resources
            .iter()
            .map(|(name, content)| (name.clone(), ContentHash::from_str(content)))
            .collect();
        rebuild.record_resource_fingerprints(&resource_fingerprints);

        let mut path_by_unit: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in sources.keys() {
            if let Some(unit) = unit_name_of(path) {
                rebuild.associate_unit(&unit, path.clone());
                path_by_unit.insert(unit, path.clone());
            }
        }
        rebuild.set_root_units(self.target.roots.iter().cloned());
        rebuild.set_properties_hash(properties_hash);

        let stale = rebuild.compute_stale_units();
        for unit in &stale.units {
            rebuild.clear_output(unit);
        }

        Ok(Attempt {
            target: self.target.clone(),
            frontend: Arc::clone(&self.frontend),
            generators: Arc::clone(&self.generators),
            sink,
            rebuild,
            rebind,
            sources,
            path_by_unit,
            resources,
            stale,
            generated_sources: BTreeMap::new(),
            compiled: BTreeSet::new(),
        })
    }
}

/// Working state of one compile attempt. Dropped wholesale on failure.
struct Attempt<'a> {
    target: TargetConfig,
    frontend: Arc<dyn Frontend>,
    generators: Arc<GeneratorRegistry>,
    sink: &'a DiagnosticSink,
    rebuild: MinimalRebuildCache,
    rebind: RebindCache,
    sources: BTreeMap<PathBuf, String>,
    path_by_unit: BTreeMap<String, PathBuf>,
    resources: BTreeMap<String, String>,
    stale: StaleSet,
    generated_sources: BTreeMap<String, String>,
    compiled: BTreeSet<String>,
}

impl Attempt<'_> {
    /// Walks the unit graph from the roots, reusing cached outputs for
    /// units that are not stale and recompiling everything else.
    ///
    /// A unit whose source is missing is deferred rather than rejected
    /// outright: a generator run later in the same pass may produce it.
    /// Deferral ends when a full round makes no progress.
    fn run(&mut self) -> Result<(), Halt> {
        let mut queue: VecDeque<String> = self.target.roots.iter().cloned().collect();
        let mut visited: BTreeSet<String> = BTreeSet::new();

        loop {
            let generated_before = self.generated_sources.len();
            let mut deferred: Vec<String> = Vec::new();

            while let Some(unit) = queue.pop_front() {
                if !visited.insert(unit.clone()) {
                    continue;
                }
                match self.visit_unit(&unit, &mut queue)? {
                    Visit::Done => {}
                    Visit::NoSource => {
                        visited.remove(&unit);
                        deferred.push(unit);
                    }
                }
            }
            if deferred.is_empty() {
                return Ok(());
            }
            if self.generated_sources.len() == generated_before {
                // A full round produced nothing new; the deferrals are real
                // unresolved references.
                for unit in &deferred {
                    self.sink.emit(
                        Diagnostic::error(
                            UNRESOLVED_REFERENCE,
                            format!(
                                "unit `{unit}` does not exist in `{}` and no generator produced it",
                                self.target.source_dir.display()
                            ),
                        )
                        .with_unit(unit.clone()),
                    );
                }
                return Err(Halt);
            }
            queue.extend(deferred);
        }
    }

    /// Reuses or recompiles one unit, enqueueing its references.
    fn visit_unit(&mut self, unit: &str, queue: &mut VecDeque<String>) -> Result<Visit, Halt> {
        // A surviving cached output means the unit was not stale this
        // attempt; traverse its cached references without reparsing.
        if self.rebuild.output_of(unit).is_some() {
            if let Some(references) = self.rebuild.references_of(unit) {
                queue.extend(references.iter().cloned());
            }
            return Ok(Visit::Done);
        }

        let source = if let Some(path) = self.path_by_unit.get(unit) {
            self.sources[path].clone()
        } else if let Some(generated) = self.generated_sources.get(unit) {
            generated.clone()
        } else {
            return Ok(Visit::NoSource);
        };

        let Some(mut tree) = self.frontend.parse(&source, self.sink) else {
            // Parse diagnostics are already in the sink.
            return Err(Halt);
        };
        if tree.unit_name() != unit {
            self.sink.emit(
                Diagnostic::error(
                    UNIT_NAME_MISMATCH,
                    format!(
                        "unit declares name `{}` but is addressed as `{unit}`",
                        tree.unit_name()
                    ),
                )
                .with_unit(unit.to_owned()),
            );
            return Err(Halt);
        }

        for directive in tree.rebinds().to_vec() {
            let generated = self.run_rebind(unit, &directive.rule, &directive.query_type)?;
            for (name, snapshot) in &generated {
                let changed = self
                    .rebuild
                    .record_generated_unit(name.clone(), snapshot.content_hash);
                if changed {
                    self.rebuild.clear_output(name);
                }
                self.generated_sources
                    .insert(name.clone(), snapshot.source.clone());
                queue.push_back(name.clone());
            }
        }

        let references: BTreeSet<String> = tree.references().iter().cloned().collect();
        self.rebuild.set_unit_references(unit, references.clone());
        queue.extend(references);

        let mut cfg = build_cfg(&tree);
        if let Err(internal) = solve_and_transform(&mut cfg, &mut tree, &UnreachableAnalysis) {
            self.sink.emit(
                Diagnostic::error(INTERNAL_ERROR, internal.to_string())
                    .with_unit(unit.to_owned())
                    .with_note("this is a bug in kiln, not a problem with the unit"),
            );
            return Err(Halt);
        }

        let text = self.frontend.lower(&tree);
        self.rebuild.record_output(unit, CompiledOutput::new(text));
        self.compiled.insert(unit.to_owned());
        Ok(Visit::Done)
    }

    /// Answers one `gen` directive, reusing the cached result when the
    /// query type is not stale and running the generator otherwise.
    fn run_rebind(
        &mut self,
        unit: &str,
        rule: &str,
        query_type: &str,
    ) -> Result<BTreeMap<String, GeneratedUnitSnapshot>, Halt> {
        let Some(generator) = self.generators.get(rule) else {
            self.sink.emit(
                Diagnostic::error(
                    UNKNOWN_RULE,
                    format!("no generator is registered for rule `{rule}`"),
                )
                .with_unit(unit.to_owned()),
            );
            return Err(Halt);
        };
        let rule_id = generator.rule_id();

        self.rebuild.add_rebinder_unit(query_type, unit);

        let cached = if self.stale.queries.contains(query_type) {
            None
        } else {
            self.rebind.get(rule_id, query_type)
        };
        let generated_units = match cached {
            Some(result) => result.generated_units.clone(),
            None => {
                let mut context = GenerateContext::new(self.resources.clone());
                let result_type = generator.generate(query_type, &mut context).map_err(|err| {
                    self.sink.emit(
                        Diagnostic::error(
                            GENERATOR_FAILED,
                            format!("rule `{rule}` failed for query `{query_type}`: {err}"),
                        )
                        .with_unit(unit.to_owned()),
                    );
                    Halt
                })?;
                self.rebuild
                    .set_resources_for_query(query_type, context.resources_read().clone());
                let result = CachedRebindResult::from_context(result_type, context);
                let generated_units = result.generated_units.clone();
                self.rebind.put(rule_id, query_type, result);
                generated_units
            }
        };
        self.rebuild.set_generated_units_for_query(
            query_type,
            generated_units.keys().cloned().collect(),
        );
        Ok(generated_units)
    }
}

fn failed_outcome(
    sink: &DiagnosticSink,
    stale: StaleSet,
    compiled: BTreeSet<String>,
) -> CompileOutcome {
    CompileOutcome {
        ok: false,
        stale_units: stale.units,
        compiled_units: compiled,
        diagnostics: sink.diagnostics(),
    }
}

/// Unit name derived from a source path's file stem.
fn unit_name_of(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_owned)
}

/// Reads every `.ku` file in a flat source directory.
fn scan_sources(dir: &Path) -> std::io::Result<BTreeMap<PathBuf, String>> {
    let mut sources = BTreeMap::new();
    if !dir.exists() {
        return Ok(sources);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path.extension().and_then(|ext| ext.to_str()) == Some("ku")
        {
            let content = std::fs::read_to_string(&path)?;
            sources.insert(path, content);
        }
    }
    Ok(sources)
}

/// Reads every file in a flat resource directory, keyed by file name.
fn scan_resources(dir: &Path) -> std::io::Result<BTreeMap<String, String>> {
    let mut resources = BTreeMap::new();
    if !dir.exists() {
        return Ok(resources);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let content = std::fs::read_to_string(entry.path())?;
        resources.insert(name, content);
    }
    Ok(resources)
}

/// Fingerprint of the target's build-configuration properties.
fn hash_properties(properties: &BTreeMap<String, String>) -> ContentHash {
    let mut canonical = String::new();
    for (key, value) in properties {
        canonical.push_str(key);
        canonical.push('=');
        canonical.push_str(value);
        canonical.push('\n');
    }
    ContentHash::from_str(&canonical)
}
