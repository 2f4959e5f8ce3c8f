//! Rebind cache and the generator interface it memoizes.
//!
//! A `gen` directive names a generation rule and a query type; running the
//! rule's [`Generator`] is expensive, so results are cached per
//! `(rule, query type)` pair in a [`RebindCache`]. Cached results are
//! immutable snapshots, replaced wholesale on regeneration and shared by
//! `Arc` between the cache and its consumers.

#![warn(missing_docs)]

pub mod cache;
pub mod generator;

pub use cache::{CachedRebindResult, GeneratedUnitSnapshot, RebindCache, RuleId};
pub use generator::{GenerateContext, GenerateError, Generator};
