//! Reset: find the best-guess original of a path and forget how it was
//! derived.
//!
//! The cascade never fails. Each tier either answers or falls through;
//! the last one treats the path as its own original.

use tracing::{debug, info};

use crate::path;
use crate::state::DerivationState;

/// Read-only view of the files in storage, used by the tiers that look
/// for an original on disk.
pub trait FileProbe {
    /// Logical directory searched for originals, e.g. `/uploads`.
    fn originals_dir(&self) -> &str;

    /// Whether a file exists at the logical `path`.
    fn exists(&self, path: &str) -> bool;

    /// File names (not paths) directly inside the logical `dir`.
    /// Unreadable or missing directories yield an empty list.
    fn file_names(&self, dir: &str) -> Vec<String>;
}

/// Which tier of the reset cascade answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTier {
    /// Exact derived-path key.
    Exact,
    /// Same derived path after slash normalization.
    Normalized,
    /// Same terminal file name, original found on disk.
    FileName,
    /// Same file ID, original found on disk.
    FileId,
    /// `_filtered`-free name exists on disk.
    Unfiltered,
    /// Nothing better: the path is treated as its own original.
    Fallback,
}

/// Outcome of [`reset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetOutcome {
    /// Best-guess original path.
    pub path: String,
    /// Tier that produced [`path`](Self::path).
    pub tier: ResetTier,
    /// Whether any mapping entry was removed.
    pub changed: bool,
}

/// Run the reset cascade for `path` against `state`.
pub fn reset(state: &mut DerivationState, probe: &dyn FileProbe, path: &str) -> ResetOutcome {
    let mut changed = false;
    let outcome = |path: String, tier: ResetTier, changed: bool| {
        info!(path = %path, ?tier, "reset resolved original");
        ResetOutcome {
            path,
            tier,
            changed,
        }
    };

    // Exact derived path.
    if let Some(root) = state.original_of.get(path).cloned() {
        state.evict(path);
        return outcome(root, ResetTier::Exact, true);
    }

    // Normalized derived path.
    let normalized = path::normalize(path);
    if let Some(key) = state
        .original_of
        .keys()
        .find(|key| path::normalize(key) == normalized)
        .cloned()
    {
        if let Some(root) = state.evict(&key) {
            return outcome(root, ResetTier::Normalized, true);
        }
    }

    let file_id = path::file_id(path);

    // Same file name elsewhere.
    let name = path::file_name(path);
    let by_name = matching_keys(state, |key| path::file_name(key) == name);
    if !by_name.is_empty() {
        debug!(path = %path, count = by_name.len(), "evicting derivations with the same file name");
        evict_all(state, &by_name);
        changed = true;
        if let Some(found) = file_id.and_then(|id| find_original(probe, id, path::extension(path))) {
            return outcome(found, ResetTier::FileName, changed);
        }
    }

    // The path is itself a root: forget everything derived from it.
    let children = matching_keys_by_root(state, path);
    if !children.is_empty() {
        debug!(path = %path, count = children.len(), "evicting derivations of this root");
        evict_all(state, &children);
        changed = true;
    }

    // Same file ID.
    if let Some(id) = file_id {
        let by_id = matching_keys(state, |key| path::file_id(key) == Some(id));
        if !by_id.is_empty() {
            debug!(path = %path, file_id = id, count = by_id.len(), "evicting derivations with the same file ID");
            evict_all(state, &by_id);
            changed = true;
            if let Some(found) = find_original(probe, id, path::extension(path)) {
                return outcome(found, ResetTier::FileId, changed);
            }
        }
    }

    // `_filtered`-free name on disk.
    if let Some(base) = path::strip_filtered(path) {
        let candidate = path::canonical(&path::join(
            probe.originals_dir(),
            &format!("{base}{}", path::extension(path)),
        ));
        if probe.exists(&candidate) {
            changed |= state.chains.remove(path).is_some();
            return outcome(candidate, ResetTier::Unfiltered, changed);
        }
    }

    // Fallback: the path is its own original.
    changed |= state.chains.remove(path).is_some();
    let stale: Vec<String> = state
        .chains
        .keys()
        .filter(|key| path::file_name(key) == name)
        .cloned()
        .collect();
    for key in stale {
        state.chains.remove(&key);
        changed = true;
    }
    outcome(path.to_owned(), ResetTier::Fallback, changed)
}

/// Look for the original of file ID `id` on disk.
///
/// Tries `{id}{ext}` first, then the shortest name in the originals
/// directory that starts with `id` and is not a filtered output. Ties
/// are broken alphabetically.
fn find_original(probe: &dyn FileProbe, id: &str, ext: &str) -> Option<String> {
    let dir = probe.originals_dir();
    let exact = path::canonical(&path::join(dir, &format!("{id}{ext}")));
    if probe.exists(&exact) {
        return Some(exact);
    }
    probe
        .file_names(dir)
        .into_iter()
        .filter(|name| name.starts_with(id) && !name.contains(path::FILTERED_INFIX))
        .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .map(|name| path::canonical(&path::join(dir, &name)))
}

fn matching_keys(state: &DerivationState, pred: impl Fn(&str) -> bool) -> Vec<String> {
    state
        .original_of
        .keys()
        .filter(|key| pred(key))
        .cloned()
        .collect()
}

fn matching_keys_by_root(state: &DerivationState, root: &str) -> Vec<String> {
    state
        .original_of
        .iter()
        .filter(|(_, r)| r.as_str() == root)
        .map(|(derived, _)| derived.clone())
        .collect()
}

fn evict_all(state: &mut DerivationState, keys: &[String]) {
    for key in keys {
        state.evict(key);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeSet;

    use retouch_filters::{AppliedFilter, Parameters};

    use super::*;

    /// In-memory file listing.
    #[derive(Default)]
    pub(crate) struct FakeFiles {
        pub(crate) dir: String,
        pub(crate) files: BTreeSet<String>,
    }

    impl FakeFiles {
        pub(crate) fn new(files: &[&str]) -> Self {
            Self {
                dir: "/uploads".to_owned(),
                files: files.iter().map(|f| (*f).to_owned()).collect(),
            }
        }
    }

    impl FileProbe for FakeFiles {
        fn originals_dir(&self) -> &str {
            &self.dir
        }

        fn exists(&self, path: &str) -> bool {
            self.files.contains(path)
        }

        fn file_names(&self, dir: &str) -> Vec<String> {
            self.files
                .iter()
                .filter(|f| path::parent(f) == dir)
                .map(|f| path::file_name(f).to_owned())
                .collect()
        }
    }

    fn filter(name: &str) -> AppliedFilter {
        AppliedFilter::new(name, Parameters::new())
    }

    fn derived(pairs: &[(&str, &str)]) -> DerivationState {
        let mut state = DerivationState::default();
        for (derived, source) in pairs {
            state.record_derivation(derived, source, filter("grayscale"));
        }
        state
    }

    #[test]
    fn exact_hit_returns_root_and_evicts() {
        let mut state = derived(&[("/uploads/img1_filtered.jpg", "/uploads/img1.jpg")]);
        let out = reset(&mut state, &FakeFiles::default(), "/uploads/img1_filtered.jpg");
        assert_eq!(out.path, "/uploads/img1.jpg");
        assert_eq!(out.tier, ResetTier::Exact);
        assert!(out.changed);
        assert!(state.chain_for("/uploads/img1_filtered.jpg").is_empty());
        assert_eq!(
            state.resolve_root("/uploads/img1_filtered.jpg"),
            "/uploads/img1_filtered.jpg"
        );
    }

    #[test]
    fn normalized_hit() {
        let mut state = derived(&[("/uploads/a_filtered.png", "/uploads/a.png")]);
        let out = reset(&mut state, &FakeFiles::default(), "uploads\\a_filtered.png");
        assert_eq!(out.path, "/uploads/a.png");
        assert_eq!(out.tier, ResetTier::Normalized);
        assert!(state.original_of().is_empty());
    }

    #[test]
    fn file_name_hit_searches_disk() {
        let mut state = derived(&[("/old/abc_filtered.jpg", "/old/abc.jpg")]);
        let files = FakeFiles::new(&["/uploads/abc.jpg", "/uploads/abc_filtered.jpg"]);
        let out = reset(&mut state, &files, "/elsewhere/abc_filtered.jpg");
        assert_eq!(out.path, "/uploads/abc.jpg");
        assert_eq!(out.tier, ResetTier::FileName);
        assert!(state.original_of().is_empty());
    }

    #[test]
    fn disk_search_prefers_shortest_unfiltered_name() {
        let files = FakeFiles::new(&[
            "/uploads/abc_ai_20240101_101010.png",
            "/uploads/abc_filtered.png",
            "/uploads/abc_v2.png",
        ]);
        assert_eq!(
            find_original(&files, "abc", ".jpg").as_deref(),
            Some("/uploads/abc_v2.png")
        );
        assert_eq!(find_original(&files, "zzz", ".jpg"), None);
    }

    #[test]
    fn root_path_evicts_children_then_falls_through() {
        let mut state = derived(&[("/uploads/r_filtered.jpg", "/uploads/r.jpg")]);
        state.chains.insert("/uploads/r.jpg".to_owned(), vec![filter("x")]);
        let out = reset(&mut state, &FakeFiles::default(), "/uploads/r.jpg");
        assert_eq!(out.path, "/uploads/r.jpg");
        assert_eq!(out.tier, ResetTier::Fallback);
        assert!(out.changed);
        assert!(state.original_of().is_empty());
        assert!(state.chains().is_empty());
    }

    #[test]
    fn file_id_hit_searches_disk() {
        let mut state = derived(&[("/uploads/k9_ai_1.jpg", "/uploads/k9.jpg")]);
        let files = FakeFiles::new(&["/uploads/k9.jpg"]);
        let out = reset(&mut state, &files, "/uploads/k9_filtered.jpg");
        assert_eq!(out.path, "/uploads/k9.jpg");
        assert_eq!(out.tier, ResetTier::FileId);
        assert!(state.original_of().is_empty());
    }

    #[test]
    fn untracked_filtered_name_finds_base_file() {
        let mut state = DerivationState::default();
        state
            .chains
            .insert("/uploads/q_filtered.jpg".to_owned(), vec![filter("blur")]);
        let files = FakeFiles::new(&["/uploads/q.jpg"]);
        let out = reset(&mut state, &files, "/uploads/q_filtered.jpg");
        assert_eq!(out.path, "/uploads/q.jpg");
        assert_eq!(out.tier, ResetTier::Unfiltered);
        assert!(state.chains().is_empty());
    }

    #[test]
    fn fallback_is_a_noop_for_unknown_paths() {
        let mut state = derived(&[("/uploads/a_filtered.jpg", "/uploads/a.jpg")]);
        let before = state.clone();
        let out = reset(&mut state, &FakeFiles::default(), "/uploads/zzz.jpg");
        assert_eq!(out.path, "/uploads/zzz.jpg");
        assert_eq!(out.tier, ResetTier::Fallback);
        assert!(!out.changed);
        assert_eq!(state, before);
    }

    #[test]
    fn fallback_drops_chains_with_same_file_name() {
        let mut state = DerivationState::default();
        state
            .chains
            .insert("/other/pic.jpg".to_owned(), vec![filter("blur")]);
        let out = reset(&mut state, &FakeFiles::default(), "/uploads/pic.jpg");
        assert_eq!(out.tier, ResetTier::Fallback);
        assert!(out.changed);
        assert!(state.chains().is_empty());
    }
}
