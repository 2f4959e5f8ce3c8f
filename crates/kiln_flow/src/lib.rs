//! Generic dataflow framework over control-flow graphs.
//!
//! An [`Analysis`] supplies a join-semilattice value type and a per-node
//! flow function; the [`solver`] iterates a monotone worklist to the least
//! fixed point. Integrated analyses may answer a node with a
//! [`Transformation`] instead of new edge assumptions; transformations are
//! deferred until convergence and then applied exactly once each.

#![warn(missing_docs)]

pub mod analysis;
pub mod assumption;
pub mod solver;
pub mod transform;
pub mod unreachable;

pub use analysis::{Analysis, FlowOutcome};
pub use assumption::Assumption;
pub use solver::{solve, solve_and_transform, EdgeAssumptions, SolveStats};
pub use transform::Transformation;
pub use unreachable::{Reach, UnreachableAnalysis};
