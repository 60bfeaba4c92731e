//! On-disk snapshot of the derivation mappings.
//!
//! The file is a JSON object with two optional keys:
//!
//! ```json
//! {
//!   "appliedFilters": { "/uploads/a_filtered.jpg": [{ "filterName": "grayscale", "parameters": {} }] },
//!   "originalImages": { "/uploads/a_filtered.jpg": "/uploads/a.jpg" }
//! }
//! ```
//!
//! PascalCase keys (`AppliedFilters`, `FilterName`, ...) are accepted on
//! read. Writes go to a sibling temporary file that is then renamed over
//! the snapshot, so a crash mid-write leaves the previous snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::state::{ChainMap, DerivationState, OriginalMap};

/// Errors reading or writing a snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Filesystem error.
    #[error("snapshot {path}: {source}")]
    Io {
        /// Snapshot file involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The file is not a valid snapshot.
    #[error("snapshot {path} is malformed: {source}")]
    Malformed {
        /// Snapshot file involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The mappings could not be serialized.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serialized form of [`DerivationState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Path -> filter chain.
    #[serde(default, alias = "AppliedFilters")]
    pub applied_filters: ChainMap,
    /// Derived path -> root path.
    #[serde(default, alias = "OriginalImages")]
    pub original_images: OriginalMap,
}

impl From<&DerivationState> for Snapshot {
    fn from(state: &DerivationState) -> Self {
        Self {
            applied_filters: state.chains().clone(),
            original_images: state.original_of().clone(),
        }
    }
}

impl From<Snapshot> for DerivationState {
    fn from(snapshot: Snapshot) -> Self {
        Self::from_maps(snapshot.original_images, snapshot.applied_filters)
    }
}

/// Read the snapshot at `path`.
///
/// Returns `Ok(None)` if no file exists.
///
/// # Errors
///
/// Returns [`SnapshotError::Io`] if the file exists but cannot be read,
/// or [`SnapshotError::Malformed`] if it does not parse.
pub fn read(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SnapshotError::Io {
                path: path.to_owned(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| SnapshotError::Malformed {
            path: path.to_owned(),
            source,
        })
}

/// Write `snapshot` to `path`, replacing any previous file.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`SnapshotError::Serialize`] or [`SnapshotError::Io`].
pub fn write(path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    let io_err = |source| SnapshotError::Io {
        path: path.to_owned(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}
