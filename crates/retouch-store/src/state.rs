//! The two derivation mappings and the lookups over them.
//!
//! [`DerivationState`] is plain data with no locking. It keeps two
//! maps:
//!
//! - `original_of`: derived path -> root path.
//! - `chains`: path -> ordered filter chain.
//!
//! A root never appears as a key of `original_of`. Mutations that would
//! route a derivation through an intermediate root re-point it to the
//! ultimate root instead.
//!
//! Both maps are ordered, so every "first match wins" tier below visits
//! keys in lexicographic order and gives the same answer on every run.

use std::collections::{BTreeMap, BTreeSet};

use retouch_filters::AppliedFilter;
use tracing::{debug, warn};

use crate::path;

/// Derived path -> root path.
pub type OriginalMap = BTreeMap<String, String>;

/// Path -> ordered filter chain.
pub type ChainMap = BTreeMap<String, Vec<AppliedFilter>>;

/// Which lookup tier answered a [`DerivationState::chain_for`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainTier {
    /// Exact key.
    Exact,
    /// Same path after slash normalization.
    Normalized,
    /// Same terminal file name in another directory.
    FileName,
    /// The path is the root of a tracked derivation.
    RootOf,
    /// Union of every chain sharing the file ID.
    FileId,
    /// The `_filtered`-free name matched by exact, normalized or file name.
    Unfiltered,
    /// Nothing matched.
    None,
}

/// What one [`DerivationState::record_derivation`] call added, so a
/// failed filter application can take it back out.
///
/// Rolling back removes this call's entries only. Entries recorded on
/// the same path after it survive.
#[derive(Debug, Clone, PartialEq)]
pub struct Undo {
    path: String,
    root: String,
    appended: AppliedFilter,
    merged: Vec<AppliedFilter>,
    previous_root: Option<String>,
    previous_chain: Option<Vec<AppliedFilter>>,
    repointed: Vec<String>,
}

/// Result of recording a derivation: the captured replay inputs plus
/// the undo record.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    /// Root image the chain replays from.
    pub root: String,
    /// Full chain of the new path, in replay order.
    pub chain: Vec<AppliedFilter>,
    /// Takes this record back out.
    pub undo: Undo,
}

/// The derivation mappings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivationState {
    pub(crate) original_of: OriginalMap,
    pub(crate) chains: ChainMap,
}

impl DerivationState {
    /// Build state from raw maps, repairing any root invariant
    /// violations.
    #[must_use]
    pub fn from_maps(original_of: OriginalMap, chains: ChainMap) -> Self {
        let mut state = Self {
            original_of,
            chains,
        };
        let repaired = state.collapse();
        if repaired > 0 {
            warn!(repaired, "collapsed derivations that pointed at derived images");
        }
        state
    }

    /// Borrow the derived -> root map.
    #[must_use]
    pub const fn original_of(&self) -> &OriginalMap {
        &self.original_of
    }

    /// Borrow the path -> chain map.
    #[must_use]
    pub const fn chains(&self) -> &ChainMap {
        &self.chains
    }

    /// Record that `new_path` is `source_path` with `filter` applied.
    ///
    /// The root is inherited from `source_path` when that is itself
    /// derived. When `new_path` differs from `source_path`, the source
    /// chain is copied into the new path's chain, skipping filters whose
    /// name the new chain already holds. `filter` is always appended.
    ///
    /// Any entry that used `new_path` as its root is re-pointed to the
    /// new root, since `new_path` is no longer a root.
    pub fn record_derivation(
        &mut self,
        new_path: &str,
        source_path: &str,
        filter: AppliedFilter,
    ) -> Recorded {
        let root = self.resolve_root(source_path);
        let undo_root = self.original_of.get(new_path).cloned();
        let undo_chain = self.chains.get(new_path).cloned();
        let mut repointed = Vec::new();
        let mut merged = Vec::new();

        // A path filtered in place with no tracked root is its own root.
        if root != new_path {
            for (derived, target) in &mut self.original_of {
                if target == new_path && derived != new_path {
                    warn!(
                        derived = %derived,
                        old_root = %new_path,
                        new_root = %root,
                        "re-pointing derivation to ultimate root"
                    );
                    target.clone_from(&root);
                    repointed.push(derived.clone());
                }
            }
            self.original_of.insert(new_path.to_owned(), root.clone());
        }

        if source_path != new_path {
            if let Some(source_chain) = self.chains.get(source_path).cloned() {
                let chain = self.chains.entry(new_path.to_owned()).or_default();
                for entry in source_chain {
                    if !chain.iter().any(|f| f.filter_name == entry.filter_name) {
                        merged.push(entry.clone());
                        chain.push(entry);
                    }
                }
            }
        }
        let chain = self.chains.entry(new_path.to_owned()).or_default();
        chain.push(filter.clone());
        let chain = chain.clone();

        debug!(path = %new_path, root = %root, len = chain.len(), "recorded derivation");
        Recorded {
            chain,
            undo: Undo {
                path: new_path.to_owned(),
                root: root.clone(),
                appended: filter,
                merged,
                previous_root: undo_root,
                previous_chain: undo_chain,
                repointed,
            },
            root,
        }
    }

    /// Take back the entries added by the `record_derivation` call that
    /// produced `undo`.
    ///
    /// When nothing else was recorded on the path since, the path is
    /// restored exactly. Otherwise only this call's filter is removed and
    /// the path keeps its root for the entries still there. A path left
    /// with an empty chain is dropped from both mappings.
    pub fn rollback(&mut self, undo: Undo) {
        let Undo {
            path,
            root,
            appended,
            merged,
            previous_root,
            previous_chain,
            repointed,
        } = undo;

        let Some(chain) = self.chains.get_mut(&path) else {
            debug!(path = %path, "nothing to roll back, path was reset");
            return;
        };
        let Some(at) = chain.iter().rposition(|f| *f == appended) else {
            debug!(path = %path, filter = %appended.filter_name, "nothing to roll back, entry already gone");
            return;
        };
        chain.remove(at);
        let remaining = chain.clone();

        let mut untouched = previous_chain.clone().unwrap_or_default();
        untouched.extend(merged);
        if remaining == untouched {
            match previous_chain {
                Some(chain) => self.chains.insert(path.clone(), chain),
                None => self.chains.remove(&path),
            };
            match previous_root {
                Some(root) => self.original_of.insert(path.clone(), root),
                None => self.original_of.remove(&path),
            };
        } else if remaining.is_empty() {
            // Everything recorded after this call was rolled back too.
            self.chains.remove(&path);
            match previous_root {
                Some(root) if previous_chain.is_none() => self.original_of.insert(path.clone(), root),
                _ => self.original_of.remove(&path),
            };
        }

        if !self.original_of.contains_key(&path) {
            for derived in repointed {
                if let Some(target) = self.original_of.get_mut(&derived).filter(|t| **t == root) {
                    target.clone_from(&path);
                }
            }
        }
        debug!(path = %path, remaining = remaining.len(), "rolled back derivation");
    }

    /// Root of `path`, or `path` itself when it is not tracked as
    /// derived.
    #[must_use]
    pub fn resolve_root(&self, path: &str) -> String {
        self.original_of
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_owned())
    }

    /// Filter chain for `path`, first tier to match wins.
    #[must_use]
    pub fn chain_for(&self, path: &str) -> Vec<AppliedFilter> {
        let (tier, chain) = self.chain_with_tier(path);
        debug!(path = %path, ?tier, len = chain.len(), "chain lookup");
        chain
    }

    /// [`chain_for`](Self::chain_for) plus the tier that answered.
    #[must_use]
    pub fn chain_with_tier(&self, path: &str) -> (ChainTier, Vec<AppliedFilter>) {
        if let Some((tier, chain)) = self.direct_chain(path) {
            return (tier, chain.clone());
        }

        if let Some(chain) = self
            .original_of
            .iter()
            .filter(|(_, root)| root.as_str() == path)
            .find_map(|(derived, _)| self.chains.get(derived))
        {
            return (ChainTier::RootOf, chain.clone());
        }

        if let Some(id) = path::file_id(path) {
            let mut combined: Vec<AppliedFilter> = Vec::new();
            let mut found = false;
            for (key, chain) in &self.chains {
                if path::file_id(key) == Some(id) {
                    found = true;
                    for entry in chain {
                        if !combined.iter().any(|f| f.filter_name == entry.filter_name) {
                            combined.push(entry.clone());
                        }
                    }
                }
            }
            if found {
                return (ChainTier::FileId, combined);
            }
        }

        if let Some(reduced) = path::unfiltered_path(path) {
            if let Some((_, chain)) = self.direct_chain(&reduced) {
                return (ChainTier::Unfiltered, chain.clone());
            }
        }

        (ChainTier::None, Vec::new())
    }

    /// Exact, normalized and file-name tiers.
    fn direct_chain(&self, path: &str) -> Option<(ChainTier, &Vec<AppliedFilter>)> {
        if let Some(chain) = self.chains.get(path) {
            return Some((ChainTier::Exact, chain));
        }
        let normalized = path::normalize(path);
        if let Some(chain) = self
            .chains
            .iter()
            .find_map(|(key, chain)| (path::normalize(key) == normalized).then_some(chain))
        {
            return Some((ChainTier::Normalized, chain));
        }
        let name = path::file_name(path);
        self.chains
            .iter()
            .find_map(|(key, chain)| (path::file_name(key) == name).then_some(chain))
            .map(|chain| (ChainTier::FileName, chain))
    }

    /// Drop `path` from both mappings. Returns its root if it had one.
    pub(crate) fn evict(&mut self, path: &str) -> Option<String> {
        self.chains.remove(path);
        self.original_of.remove(path)
    }

    /// Enforce the root invariant: drop self-mappings, re-point every
    /// derivation to its ultimate root, drop cyclic entries.
    ///
    /// Returns the number of entries changed or dropped.
    pub fn collapse(&mut self) -> usize {
        let before = self.original_of.len();
        self.original_of.retain(|derived, root| derived != root);
        let mut changed = before - self.original_of.len();

        let snapshot = self.original_of.clone();
        let mut cyclic = Vec::new();
        for (derived, target) in &mut self.original_of {
            let mut seen = BTreeSet::from([derived.clone()]);
            let mut root = target.clone();
            let mut cycle = false;
            while let Some(next) = snapshot.get(&root) {
                if !seen.insert(root.clone()) {
                    cycle = true;
                    break;
                }
                root.clone_from(next);
            }
            if cycle {
                cyclic.push(derived.clone());
            } else if root != *target {
                *target = root;
                changed += 1;
            }
        }

        for derived in cyclic {
            warn!(path = %derived, "dropping cyclic derivation");
            self.original_of.remove(&derived);
            changed += 1;
        }
        changed
    }
}
