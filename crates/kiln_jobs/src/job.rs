//! One compile request and its result slot.

use kiln_diagnostics::DiagnosticSink;
use kiln_rebuild::CompileOutcome;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique job identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

/// Lifecycle of a job. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    /// Constructed, not yet handed to an outbox.
    Created,
    /// Accepted by an outbox, waiting in its queue.
    Queued,
    /// Being compiled by the outbox worker.
    Running,
    /// Finished; the result slot is filled.
    Completed,
}

struct ResultSlot {
    state: JobState,
    outcome: Option<CompileOutcome>,
}

/// An immutable compile request plus a result slot filled exactly once.
///
/// The request half (target, advisory changed paths, sink) never changes
/// after construction. The slot half is shared between the submitting
/// thread and the outbox worker; waiters block on a condition variable, so
/// there is no polling.
pub struct Job {
    id: JobId,
    target: String,
    changed_inputs: Vec<PathBuf>,
    sink: Arc<DiagnosticSink>,
    slot: Mutex<ResultSlot>,
    completed: Condvar,
}

impl Job {
    /// Creates a job asking for one compile of `target`.
    pub fn new(
        target: impl Into<String>,
        changed_inputs: Vec<PathBuf>,
        sink: Arc<DiagnosticSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: JobId(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed)),
            target: target.into(),
            changed_inputs,
            sink,
            slot: Mutex::new(ResultSlot {
                state: JobState::Created,
                outcome: None,
            }),
            completed: Condvar::new(),
        })
    }

    /// This job's process-unique identity.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The build target this job compiles.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Advisory changed paths passed through to the recompiler.
    pub fn changed_inputs(&self) -> &[PathBuf] {
        &self.changed_inputs
    }

    /// The sink this job's diagnostics accumulate into.
    pub fn sink(&self) -> &Arc<DiagnosticSink> {
        &self.sink
    }

    /// The job's current lifecycle state.
    pub fn state(&self) -> JobState {
        self.slot.lock().unwrap().state
    }

    /// Blocks until the job completes and returns its outcome.
    pub fn wait_for_result(&self) -> CompileOutcome {
        let mut slot = self.slot.lock().unwrap();
        loop {
            if let Some(outcome) = &slot.outcome {
                return outcome.clone();
            }
            slot = self.completed.wait(slot).unwrap();
        }
    }

    /// Advances the lifecycle state. Backward transitions are ignored; the
    /// state machine only moves forward.
    pub(crate) fn advance(&self, to: JobState) {
        let mut slot = self.slot.lock().unwrap();
        if to > slot.state {
            slot.state = to;
        }
    }

    /// Fills the result slot and wakes every waiter. The first completion
    /// wins; a second call changes nothing.
    pub(crate) fn complete(&self, outcome: CompileOutcome) {
        let mut slot = self.slot.lock().unwrap();
        if slot.outcome.is_none() {
            slot.outcome = Some(outcome);
            slot.state = JobState::Completed;
        }
        drop(slot);
        self.completed.notify_all();
    }
}
