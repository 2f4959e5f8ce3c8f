//! Routing of jobs to per-target outboxes.

use crate::job::Job;
use crate::outbox::Outbox;
use kiln_config::{validate_config, ConfigError, ProjectConfig};
use kiln_rebuild::{
    CacheError, Frontend, GeneratorRegistry, RebuildCacheManager, Recompiler,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Why the runner could not be built.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The project configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A target's cache state could not be checked out.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// An outbox worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Why a job was rejected at submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The job names a target no outbox serves.
    #[error("unknown build target `{0}`")]
    UnknownTarget(String),
    /// The target's outbox has already been shut down.
    #[error("outbox for target `{0}` is shut down")]
    ShutDown(String),
}

/// Routes jobs to per-target outboxes.
///
/// Construction validates the configuration and checks every target's cache
/// state out of the manager before any outbox (and thus any worker thread)
/// exists, so a bad registration can never leave half a runner behind.
/// Outboxes for different targets share no mutable state and run
/// concurrently.
pub struct JobRunner {
    outboxes: BTreeMap<String, Outbox>,
}

impl JobRunner {
    /// Builds one outbox per configured target.
    pub fn from_config(
        config: &ProjectConfig,
        manager: &RebuildCacheManager,
        frontend: Arc<dyn Frontend>,
        generators: Arc<GeneratorRegistry>,
    ) -> Result<Self, RunnerError> {
        validate_config(config)?;

        // Check every target's state out first; only then spawn workers.
        let mut recompilers = Vec::with_capacity(config.targets.len());
        for target in &config.targets {
            let state = match manager.take(&target.name) {
                Ok(state) => state,
                Err(CacheError::UnknownTarget(_)) => {
                    manager.register(&target.name);
                    manager.take(&target.name)?
                }
                Err(err) => return Err(err.into()),
            };
            recompilers.push(Recompiler::new(
                target.clone(),
                state,
                Arc::clone(&frontend),
                Arc::clone(&generators),
            ));
        }

        let mut outboxes = BTreeMap::new();
        for recompiler in recompilers {
            let name = recompiler.target_name().to_owned();
            outboxes.insert(name, Outbox::new(recompiler)?);
        }
        Ok(Self { outboxes })
    }

    /// Enqueues a job on its target's outbox.
    pub fn submit(&self, job: Arc<Job>) -> Result<(), SubmitError> {
        let target = job.target().to_owned();
        let Some(outbox) = self.outboxes.get(&target) else {
            return Err(SubmitError::UnknownTarget(target));
        };
        if !outbox.submit(job) {
            return Err(SubmitError::ShutDown(target));
        }
        Ok(())
    }

    /// Drains every outbox, joins the workers, and hands each target's
    /// cache state back to the manager.
    pub fn shutdown(self, manager: &RebuildCacheManager) {
        for (target, outbox) in self.outboxes {
            let state = outbox.shutdown();
            manager.restore_entry(target, state);
        }
    }
}
