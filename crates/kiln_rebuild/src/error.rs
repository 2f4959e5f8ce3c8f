//! Errors from cache-state management.

use thiserror::Error;

/// Why a cache-manager operation failed.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The named target has no entry in the manager.
    #[error("unknown build target `{0}`")]
    UnknownTarget(String),

    /// The target's state is currently checked out by a recompiler.
    #[error("state for target `{0}` is checked out")]
    CheckedOut(String),

    /// A snapshot could not be encoded.
    #[error("failed to encode cache snapshot: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// A snapshot blob could not be decoded.
    #[error("failed to decode cache snapshot: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
