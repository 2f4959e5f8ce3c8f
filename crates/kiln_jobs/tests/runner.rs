//! Scheduling tests: FIFO outboxes, panic containment, state handback.

use kiln_config::{ProjectConfig, TargetConfig};
use kiln_diagnostics::DiagnosticSink;
use kiln_jobs::{Job, JobRunner, JobState, RunnerError, SubmitError};
use kiln_rebind::{GenerateContext, GenerateError, Generator};
use kiln_rebuild::recompiler::INTERNAL_ERROR;
use kiln_rebuild::{
    Frontend, GeneratorRegistry, RebuildCacheManager, UnitFrontend,
};
use kiln_syntax::SyntaxTree;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_unit(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(format!("{name}.ku")), body).unwrap();
}

fn target(name: &str, source_dir: PathBuf) -> TargetConfig {
    TargetConfig {
        name: name.to_owned(),
        source_dir,
        resource_dir: None,
        roots: vec!["main".to_owned()],
        properties: BTreeMap::new(),
    }
}

fn single_target_project() -> (TempDir, ProjectConfig) {
    let dir = TempDir::new().unwrap();
    write_unit(dir.path(), "main", "unit main\nret\n");
    let config = ProjectConfig {
        targets: vec![target("web", dir.path().to_owned())],
    };
    (dir, config)
}

fn runner(
    config: &ProjectConfig,
    manager: &RebuildCacheManager,
    frontend: Arc<dyn Frontend>,
    generators: GeneratorRegistry,
) -> JobRunner {
    JobRunner::from_config(config, manager, frontend, Arc::new(generators)).unwrap()
}

fn job(target: &str, changed: &[PathBuf]) -> Arc<Job> {
    Job::new(target, changed.to_vec(), Arc::new(DiagnosticSink::new()))
}

/// Parses like the reference front end but tracks parse concurrency.
struct TrackingFrontend {
    inner: UnitFrontend,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl TrackingFrontend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: UnitFrontend,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }
}

impl Frontend for TrackingFrontend {
    fn parse(&self, source: &str, sink: &DiagnosticSink) -> Option<SyntaxTree> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
        let tree = self.inner.parse(source, sink);
        self.active.fetch_sub(1, Ordering::SeqCst);
        tree
    }

    fn lower(&self, tree: &SyntaxTree) -> String {
        self.inner.lower(tree)
    }
}

struct PanickingGenerator;

impl Generator for PanickingGenerator {
    fn canonical_description(&self) -> String {
        "generator that always panics".to_owned()
    }

    fn generate(
        &self,
        _query_type: &str,
        _context: &mut GenerateContext,
    ) -> Result<String, GenerateError> {
        panic!("deliberate generator panic");
    }
}

#[test]
fn jobs_on_one_target_run_in_order_without_overlap() {
    let (dir, config) = single_target_project();
    let manager = RebuildCacheManager::new();
    let frontend = TrackingFrontend::new();
    let runner = runner(
        &config,
        &manager,
        frontend.clone(),
        GeneratorRegistry::new(),
    );

    // Force every job to actually recompile so parses are observable.
    let changed = vec![dir.path().join("main.ku")];
    let jobs: Vec<Arc<Job>> = (0..4).map(|_| job("web", &changed)).collect();
    for j in &jobs {
        runner.submit(Arc::clone(j)).unwrap();
    }
    let last = jobs.last().unwrap().wait_for_result();
    assert!(last.is_ok());

    // FIFO draining: once the last job finished, every earlier one has too.
    for j in &jobs {
        assert_eq!(j.state(), JobState::Completed);
        assert!(j.wait_for_result().is_ok());
    }
    assert_eq!(frontend.max_active.load(Ordering::SeqCst), 1);

    runner.shutdown(&manager);
}

#[test]
fn different_targets_run_concurrently_and_independently() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    write_unit(dir_a.path(), "main", "unit main\nlet a = 1\nret\n");
    write_unit(dir_b.path(), "main", "unit main\nlet b = 2\nret\n");
    let config = ProjectConfig {
        targets: vec![
            target("alpha", dir_a.path().to_owned()),
            target("beta", dir_b.path().to_owned()),
        ],
    };
    let manager = RebuildCacheManager::new();
    let runner = runner(
        &config,
        &manager,
        Arc::new(UnitFrontend),
        GeneratorRegistry::new(),
    );

    let alpha = job("alpha", &[]);
    let beta = job("beta", &[]);
    runner.submit(Arc::clone(&alpha)).unwrap();
    runner.submit(Arc::clone(&beta)).unwrap();
    assert!(alpha.wait_for_result().is_ok());
    assert!(beta.wait_for_result().is_ok());

    runner.shutdown(&manager);
    let alpha_state = manager.take("alpha").unwrap();
    let beta_state = manager.take("beta").unwrap();
    assert!(alpha_state.rebuild.output_of("main").unwrap().text.contains("set a"));
    assert!(beta_state.rebuild.output_of("main").unwrap().text.contains("set b"));
}

#[test]
fn a_panicking_job_fails_but_the_worker_keeps_draining() {
    let dir = TempDir::new().unwrap();
    write_unit(dir.path(), "main", "unit main\ngen boom Widget\nret\n");
    let config = ProjectConfig {
        targets: vec![target("web", dir.path().to_owned())],
    };
    let manager = RebuildCacheManager::new();
    let mut generators = GeneratorRegistry::new();
    generators.register("boom", Arc::new(PanickingGenerator));
    let runner = runner(&config, &manager, Arc::new(UnitFrontend), generators);

    let broken = job("web", &[]);
    runner.submit(Arc::clone(&broken)).unwrap();
    let outcome = broken.wait_for_result();
    assert!(!outcome.is_ok());
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.code == INTERNAL_ERROR && d.message.contains("panicked")));

    // The worker survives: a fixed source compiles on the same outbox.
    write_unit(dir.path(), "main", "unit main\nret\n");
    let fixed = job("web", &[dir.path().join("main.ku")]);
    runner.submit(Arc::clone(&fixed)).unwrap();
    assert!(fixed.wait_for_result().is_ok());

    runner.shutdown(&manager);
}

#[test]
fn submit_to_unknown_target_is_rejected() {
    let (_dir, config) = single_target_project();
    let manager = RebuildCacheManager::new();
    let runner = runner(
        &config,
        &manager,
        Arc::new(UnitFrontend),
        GeneratorRegistry::new(),
    );

    let stray = job("native", &[]);
    assert!(matches!(
        runner.submit(stray),
        Err(SubmitError::UnknownTarget(_))
    ));
    runner.shutdown(&manager);
}

#[test]
fn invalid_config_fails_before_any_outbox_exists() {
    let (_dir, mut config) = single_target_project();
    config.targets.push(config.targets[0].clone());

    let manager = RebuildCacheManager::new();
    let result = JobRunner::from_config(
        &config,
        &manager,
        Arc::new(UnitFrontend),
        Arc::new(GeneratorRegistry::new()),
    );
    assert!(matches!(result, Err(RunnerError::Config(_))));
    // The manager never registered the target, so nothing is checked out.
    assert!(manager.take("web").is_err());
}

#[test]
fn shutdown_hands_cache_state_back_to_the_manager() {
    let (dir, config) = single_target_project();
    let manager = RebuildCacheManager::new();
    let runner = runner(
        &config,
        &manager,
        Arc::new(UnitFrontend),
        GeneratorRegistry::new(),
    );

    let first = job("web", &[]);
    runner.submit(Arc::clone(&first)).unwrap();
    assert!(first.wait_for_result().is_ok());

    write_unit(dir.path(), "main", "unit main\nlet v = 7\nret\n");
    let second = job("web", &[]);
    runner.submit(Arc::clone(&second)).unwrap();
    let outcome = second.wait_for_result();
    assert!(outcome.is_ok());
    assert!(outcome.compiled_units.contains("main"));

    runner.shutdown(&manager);
    let state = manager.take("web").unwrap();
    assert!(state.rebuild.is_populated());
    assert!(state.rebuild.output_of("main").unwrap().text.contains("set v"));
}
