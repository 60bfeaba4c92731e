//! Image bytes on the local filesystem.
//!
//! Logical paths such as `/uploads/a.jpg` map to files under a storage
//! root. Paths that would escape the root are rejected.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use retouch_store::{FileProbe, path};
use tracing::debug;

/// Errors reading or writing stored images.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No file exists at the logical path.
    #[error("no image at {0}")]
    NotFound(String),

    /// The logical path is empty or leaves the storage root.
    #[error("invalid storage path: {0:?}")]
    InvalidPath(String),

    /// Filesystem error.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

/// Filesystem-backed blob storage.
#[derive(Debug, Clone)]
pub struct BlobStorage {
    root: PathBuf,
    upload_dir: String,
}

impl BlobStorage {
    /// Storage rooted at `root`, with uploads going to `upload_dir`
    /// (relative to the root).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, upload_dir: &str) -> Self {
        Self {
            root: root.into(),
            upload_dir: path::canonical(upload_dir.trim_end_matches(['/', '\\'])),
        }
    }

    /// Filesystem root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Logical upload directory, e.g. `/uploads`.
    #[must_use]
    pub fn upload_dir(&self) -> &str {
        &self.upload_dir
    }

    /// Logical path of `name` inside the upload directory.
    #[must_use]
    pub fn upload_path(&self, name: &str) -> String {
        path::canonical(&path::join(&self.upload_dir, name))
    }

    /// Filesystem location of a logical path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] for empty paths and paths
    /// with `..` or absolute components after normalization.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf, StorageError> {
        let relative = path::normalize(logical);
        let relative = Path::new(&relative);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.as_os_str().is_empty() || escapes {
            return Err(StorageError::InvalidPath(logical.to_owned()));
        }
        Ok(self.root.join(relative))
    }

    /// Whether a regular file exists at the logical path.
    #[must_use]
    pub fn exists(&self, logical: &str) -> bool {
        self.resolve(logical).is_ok_and(|p| p.is_file())
    }

    /// Read the bytes stored at a logical path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if there is no file, or
    /// [`StorageError::Io`] if it cannot be read.
    pub fn read(&self, logical: &str) -> Result<Vec<u8>, StorageError> {
        let file = self.resolve(logical)?;
        fs::read(&file).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound(logical.to_owned())
            } else {
                StorageError::Io { path: file, source }
            }
        })
    }

    /// Write `bytes` to a logical path, creating directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] or [`StorageError::Io`].
    pub fn write(&self, logical: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let file = self.resolve(logical)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_owned(),
                source,
            })?;
        }
        fs::write(&file, bytes).map_err(|source| StorageError::Io { path: file, source })?;
        debug!(path = %logical, bytes = bytes.len(), "stored image");
        Ok(())
    }

    /// Store upload bytes under a fresh name in the upload directory.
    ///
    /// `extension` includes the dot, e.g. `.jpg`.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    pub fn store_upload(&self, bytes: &[u8], extension: &str) -> Result<String, StorageError> {
        let logical = self.upload_path(&format!("{}{extension}", uuid::Uuid::new_v4()));
        self.write(&logical, bytes)?;
        Ok(logical)
    }

    /// Shortest file name in the upload directory that starts with
    /// `file_id`, as a logical path. Ties are broken alphabetically.
    #[must_use]
    pub fn find_by_file_id(&self, file_id: &str) -> Option<String> {
        self.file_names(&self.upload_dir)
            .into_iter()
            .filter(|name| name.starts_with(file_id))
            .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            .map(|name| self.upload_path(&name))
    }
}

impl FileProbe for BlobStorage {
    fn originals_dir(&self) -> &str {
        &self.upload_dir
    }

    fn exists(&self, path: &str) -> bool {
        Self::exists(self, path)
    }

    fn file_names(&self, dir: &str) -> Vec<String> {
        let Ok(dir) = self.resolve(dir) else {
            return Vec::new();
        };
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }
}
