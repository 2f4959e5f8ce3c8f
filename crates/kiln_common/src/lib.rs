//! Shared foundation types for the kiln recompilation core.
//!
//! Provides content hashing for change detection, the generic arena that
//! backs both the syntax tree and the control-flow graph, and the internal
//! error type used for fatal invariant violations.

#![warn(missing_docs)]

pub mod arena;
pub mod hash;
pub mod result;

pub use arena::{Arena, ArenaId};
pub use hash::ContentHash;
pub use result::{InternalError, KilnResult};
