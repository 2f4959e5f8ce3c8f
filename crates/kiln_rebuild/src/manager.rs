//! Process-lifetime owner of known-good per-target cache state.

use crate::cache::MinimalRebuildCache;
use crate::error::CacheError;
use kiln_rebind::RebindCache;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// One target's known-good caches, moved as a unit.
#[derive(Debug, Clone, Default)]
pub struct TargetState {
    /// Fingerprint and dependency bookkeeping.
    pub rebuild: MinimalRebuildCache,
    /// Cached rebind results.
    pub rebind: RebindCache,
}

enum Slot {
    Present(TargetState),
    CheckedOut,
}

/// Owns every target's known-good cache state for the life of the process.
///
/// Targets check their state out with [`take`] (single-owner discipline:
/// exactly one recompiler works against a target's caches) and hand it back
/// with [`restore_entry`] at shutdown. The map is behind a `Mutex` because
/// different targets' workers call in concurrently; the lock covers only
/// the move in or out, never a compile.
///
/// [`take`]: RebuildCacheManager::take
/// [`restore_entry`]: RebuildCacheManager::restore_entry
#[derive(Default)]
pub struct RebuildCacheManager {
    entries: Mutex<BTreeMap<String, Slot>>,
}

impl RebuildCacheManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target with fresh, unpopulated state. Replaces any
    /// previous entry for the name.
    pub fn register(&self, target: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(target.into(), Slot::Present(TargetState::default()));
    }

    /// Moves a target's state out for exclusive use by its recompiler.
    pub fn take(&self, target: &str) -> Result<TargetState, CacheError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(target) {
            None => Err(CacheError::UnknownTarget(target.to_owned())),
            Some(slot @ Slot::Present(_)) => {
                let Slot::Present(state) = std::mem::replace(slot, Slot::CheckedOut) else {
                    unreachable!()
                };
                Ok(state)
            }
            Some(Slot::CheckedOut) => Err(CacheError::CheckedOut(target.to_owned())),
        }
    }

    /// Returns a target's state, typically at shutdown.
    pub fn restore_entry(&self, target: impl Into<String>, state: TargetState) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(target.into(), Slot::Present(state));
    }

    /// Serializes a target's rebuild cache as an opaque blob.
    ///
    /// Rebind results hold live generator output and are process-lifetime
    /// only; they are not part of the snapshot.
    pub fn snapshot(&self, target: &str) -> Result<Vec<u8>, CacheError> {
        let entries = self.entries.lock().unwrap();
        match entries.get(target) {
            None => Err(CacheError::UnknownTarget(target.to_owned())),
            Some(Slot::CheckedOut) => Err(CacheError::CheckedOut(target.to_owned())),
            Some(Slot::Present(state)) => Ok(bincode::serde::encode_to_vec(
                &state.rebuild,
                bincode::config::standard(),
            )?),
        }
    }

    /// Restores a target's rebuild cache from a snapshot blob, pairing it
    /// with an empty rebind cache.
    pub fn restore(&self, target: impl Into<String>, blob: &[u8]) -> Result<(), CacheError> {
        let (rebuild, _): (MinimalRebuildCache, usize) =
            bincode::serde::decode_from_slice(blob, bincode::config::standard())?;
        self.restore_entry(
            target,
            TargetState {
                rebuild,
                rebind: RebindCache::new(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_common::ContentHash;

    #[test]
    fn take_enforces_single_ownership() {
        let manager = RebuildCacheManager::new();
        manager.register("web");

        let state = manager.take("web").unwrap();
        assert!(matches!(
            manager.take("web"),
            Err(CacheError::CheckedOut(_))
        ));

        manager.restore_entry("web", state);
        assert!(manager.take("web").is_ok());
    }

    #[test]
    fn unknown_target_is_an_error() {
        let manager = RebuildCacheManager::new();
        assert!(matches!(
            manager.take("nope"),
            Err(CacheError::UnknownTarget(_))
        ));
        assert!(matches!(
            manager.snapshot("nope"),
            Err(CacheError::UnknownTarget(_))
        ));
    }

    #[test]
    fn snapshot_roundtrips_rebuild_state() {
        let manager = RebuildCacheManager::new();
        manager.register("web");

        let mut state = manager.take("web").unwrap();
        state.rebuild.set_properties_hash(ContentHash::from_str("p"));
        state.rebuild.associate_unit("main", "src/main.ku");
        manager.restore_entry("web", state);

        let blob = manager.snapshot("web").unwrap();
        manager.restore("copy", &blob).unwrap();

        let restored = manager.take("copy").unwrap();
        assert!(restored.rebuild.is_populated());
        assert_eq!(
            restored.rebuild.unit_for_path("src/main.ku".as_ref()),
            Some("main")
        );
        assert!(restored.rebind.is_empty());
    }
}
