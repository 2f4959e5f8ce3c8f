//! Job scheduling: one FIFO outbox and worker thread per build target.
//!
//! A [`Job`] asks for one compile of one target. The [`JobRunner`] routes it
//! to the target's [`Outbox`], whose single worker thread runs jobs strictly
//! in submission order against the target's recompiler. Different targets
//! share nothing mutable and run concurrently.

#![warn(missing_docs)]

pub mod job;
pub mod outbox;
pub mod runner;

pub use job::{Job, JobId, JobState};
pub use outbox::Outbox;
pub use runner::{JobRunner, RunnerError, SubmitError};
