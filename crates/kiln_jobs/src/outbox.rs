//! One target's FIFO queue and its dedicated worker thread.

use crate::job::{Job, JobState};
use kiln_diagnostics::Diagnostic;
use kiln_rebuild::recompiler::INTERNAL_ERROR;
use kiln_rebuild::{CompileOutcome, Recompiler, TargetState};
use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A build target's job queue.
///
/// Exactly one worker thread drains the queue, so at most one job runs
/// against the target's recompiler at a time and submission order is
/// completion order. The recompiler lives on the worker thread for the
/// outbox's whole lifetime and is handed back at shutdown.
pub struct Outbox {
    target: String,
    sender: Option<Sender<Arc<Job>>>,
    worker: Option<JoinHandle<TargetState>>,
}

impl Outbox {
    /// Spawns the worker thread and takes ownership of the recompiler.
    pub fn new(recompiler: Recompiler) -> std::io::Result<Self> {
        let target = recompiler.target_name().to_owned();
        let (sender, receiver) = mpsc::channel::<Arc<Job>>();
        let thread_name = format!("kiln-outbox-{target}");
        let worker = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let mut recompiler = recompiler;
                for job in receiver.iter() {
                    run_job(&mut recompiler, &job);
                }
                recompiler.into_state()
            })?;
        Ok(Self {
            target,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// The target this outbox serves.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Enqueues a job. Returns `false` if the outbox is already shut down.
    pub fn submit(&self, job: Arc<Job>) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        job.advance(JobState::Queued);
        sender.send(job).is_ok()
    }

    /// Closes the queue, joins the worker, and returns the target's cache
    /// state. Jobs already queued still run to completion first.
    pub fn shutdown(mut self) -> TargetState {
        self.sender = None;
        self.worker
            .take()
            .map(|worker| worker.join().expect("outbox worker panicked outside a job"))
            .unwrap_or_default()
    }
}

/// Runs one job, converting a recompiler panic into a failed result so the
/// worker can keep draining the queue.
///
/// Unwinding cannot corrupt the recompiler: a compile attempt mutates only
/// local working copies until its final commit, so after a caught panic the
/// known-good caches are still exactly the pre-attempt state.
fn run_job(recompiler: &mut Recompiler, job: &Arc<Job>) {
    job.advance(JobState::Running);
    let attempt = catch_unwind(AssertUnwindSafe(|| {
        recompiler.compile(job.changed_inputs(), job.sink())
    }));
    let outcome = match attempt {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            job.sink().emit(
                Diagnostic::error(
                    INTERNAL_ERROR,
                    format!("compile attempt panicked: {message}"),
                )
                .with_note("this is a bug in kiln, not a problem with the unit sources"),
            );
            CompileOutcome {
                ok: false,
                stale_units: BTreeSet::new(),
                compiled_units: BTreeSet::new(),
                diagnostics: job.sink().diagnostics(),
            }
        }
    };
    job.complete(outcome);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
