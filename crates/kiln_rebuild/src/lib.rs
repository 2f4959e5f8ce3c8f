//! Minimal-rebuild caching and the per-target recompiler.
//!
//! A [`MinimalRebuildCache`] remembers fingerprints, dependency edges, and
//! compile products for one build target; a [`Recompiler`] uses it to
//! recompile only what a change actually invalidated. The
//! [`RebuildCacheManager`] owns every target's known-good state for the
//! life of the process, and each compile attempt commits its working
//! copies atomically or not at all.

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod frontend;
pub mod manager;
pub mod recompiler;

pub use cache::{CompiledOutput, MinimalRebuildCache, StaleSet};
pub use error::CacheError;
pub use frontend::{Frontend, UnitFrontend};
pub use manager::{RebuildCacheManager, TargetState};
pub use recompiler::{CompileOutcome, GeneratorRegistry, Recompiler};
