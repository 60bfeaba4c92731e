//! Thread-safe derivation store with write-through persistence.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use retouch_filters::AppliedFilter;
use tracing::{debug, error, info, warn};

use crate::reset::{self, FileProbe, ResetOutcome};
use crate::snapshot::{self, Snapshot};
use crate::state::{DerivationState, Recorded, Undo};

/// Owner of the derivation mappings.
///
/// One lock covers both mappings. Mutations and their snapshot write
/// happen under the write lock; lookups take the read lock and return
/// owned copies, so callers never hold the lock across image I/O.
#[derive(Debug, Default)]
pub struct DerivationStore {
    state: RwLock<DerivationState>,
    snapshot_path: Option<PathBuf>,
}

impl DerivationStore {
    /// Empty store that never touches disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store backed by the snapshot at `path`.
    ///
    /// An existing snapshot is loaded. A missing, unreadable or
    /// malformed snapshot is logged and the store starts empty; the next
    /// mutation overwrites the file.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match snapshot::read(&path) {
            Ok(Some(snapshot)) => {
                let state = DerivationState::from(snapshot);
                info!(
                    path = %path.display(),
                    derived = state.original_of().len(),
                    chains = state.chains().len(),
                    "loaded derivation snapshot"
                );
                state
            }
            Ok(None) => {
                debug!(path = %path.display(), "no derivation snapshot, starting empty");
                DerivationState::default()
            }
            Err(e) => {
                error!(error = %e, "failed to load derivation snapshot, starting empty");
                DerivationState::default()
            }
        };
        Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        }
    }

    /// Snapshot file, if any.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Record a filter application and persist.
    ///
    /// See [`DerivationState::record_derivation`].
    pub fn record_derivation(
        &self,
        new_path: &str,
        source_path: &str,
        filter: AppliedFilter,
    ) -> Recorded {
        let mut state = self.state.write();
        let recorded = state.record_derivation(new_path, source_path, filter);
        self.save(&state);
        recorded
    }

    /// Undo a [`record_derivation`](Self::record_derivation) and persist.
    pub fn rollback(&self, undo: Undo) {
        let mut state = self.state.write();
        state.rollback(undo);
        warn!("rolled back derivation after failed application");
        self.save(&state);
    }

    /// Root of `path`, or `path` itself.
    #[must_use]
    pub fn resolve_root(&self, path: &str) -> String {
        self.state.read().resolve_root(path)
    }

    /// Filter chain for `path` via the tiered lookup.
    #[must_use]
    pub fn chain_for(&self, path: &str) -> Vec<AppliedFilter> {
        self.state.read().chain_for(path)
    }

    /// Root and chain of `path`, read under one lock.
    #[must_use]
    pub fn replay_plan(&self, path: &str) -> (String, Vec<AppliedFilter>) {
        let state = self.state.read();
        (state.resolve_root(path), state.chain_for(path))
    }

    /// Run the reset cascade and persist if anything changed.
    pub fn reset(&self, probe: &dyn FileProbe, path: &str) -> ResetOutcome {
        let mut state = self.state.write();
        let outcome = reset::reset(&mut state, probe, path);
        if outcome.changed {
            self.save(&state);
        }
        outcome
    }

    /// Copy of the current mappings.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from(&*self.state.read())
    }

    /// Persist `state`. Failures are logged; the next mutation retries.
    fn save(&self, state: &DerivationState) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        match snapshot::write(path, &Snapshot::from(state)) {
            Ok(()) => debug!(path = %path.display(), "saved derivation snapshot"),
            Err(e) => error!(error = %e, "failed to save derivation snapshot"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use retouch_filters::Parameters;

    use super::*;
    use crate::reset::ResetTier;
    use crate::reset::tests::FakeFiles;

    fn filter(name: &str) -> AppliedFilter {
        AppliedFilter::new(name, Parameters::new())
    }

    #[test]
    fn mutations_are_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters_data.json");

        let store = DerivationStore::open(&path);
        store.record_derivation("/uploads/a_filtered.jpg", "/uploads/a.jpg", filter("grayscale"));
        drop(store);

        let reopened = DerivationStore::open(&path);
        assert_eq!(reopened.resolve_root("/uploads/a_filtered.jpg"), "/uploads/a.jpg");
        assert_eq!(reopened.chain_for("/uploads/a_filtered.jpg").len(), 1);

        let outcome = reopened.reset(&FakeFiles::default(), "/uploads/a_filtered.jpg");
        assert_eq!(outcome.tier, ResetTier::Exact);
        drop(reopened);

        let again = DerivationStore::open(&path);
        assert_eq!(again.snapshot(), Snapshot::default());
    }

    #[test]
    fn malformed_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters_data.json");
        fs::write(&path, "garbage").unwrap();

        let store = DerivationStore::open(&path);
        assert_eq!(store.snapshot(), Snapshot::default());

        // The next mutation replaces the bad file.
        store.record_derivation("/u/b_filtered.png", "/u/b.png", filter("invert"));
        assert!(snapshot::read(&path).unwrap().is_some());
    }

    #[test]
    fn rollback_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters_data.json");
        let store = DerivationStore::open(&path);
        let recorded = store.record_derivation("/u/c_filtered.png", "/u/c.png", filter("invert"));
        store.rollback(recorded.undo);
        assert_eq!(snapshot::read(&path).unwrap(), Some(Snapshot::default()));
    }

    #[test]
    fn interleaved_rollbacks_persist_an_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters_data.json");
        let store = DerivationStore::open(&path);
        let first = store.record_derivation("/u/c_filtered.png", "/u/c.png", filter("sepia"));
        let second = store.record_derivation("/u/c_filtered.png", "/u/c.png", filter("invert"));
        store.rollback(first.undo);
        assert_eq!(store.chain_for("/u/c_filtered.png").len(), 1);
        store.rollback(second.undo);
        assert_eq!(snapshot::read(&path).unwrap(), Some(Snapshot::default()));
        assert_eq!(DerivationStore::open(&path).resolve_root("/u/c_filtered.png"), "/u/c_filtered.png");
    }

    #[test]
    fn in_memory_store_has_no_snapshot() {
        let store = DerivationStore::in_memory();
        store.record_derivation("/u/d_filtered.png", "/u/d.png", filter("invert"));
        assert!(store.snapshot_path().is_none());
        let (root, chain) = store.replay_plan("/u/d_filtered.png");
        assert_eq!(root, "/u/d.png");
        assert_eq!(chain.len(), 1);
    }
}
