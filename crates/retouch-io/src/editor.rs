//! The editor service: every externally visible operation.
//!
//! [`Editor`] ties the pure pieces together. It owns the filter
//! registry, the derivation store, the blob storage and, optionally,
//! an AI provider. Store lookups are copied out before any image I/O,
//! so the store lock is never held while decoding, encoding, reading,
//! writing or waiting on the provider.

use std::collections::{BTreeMap, BTreeSet};

use image::ImageFormat;
use parking_lot::{Condvar, Mutex};
use retouch_filters::{
    AI_EDIT_FILTER, AppliedFilter, FilterRegistry, FilterSpec, ParamValue, Parameters, codec,
    convert_parameters,
};
use retouch_store::{DerivationStore, path};
use tracing::{info, warn};

use crate::config::EditorConfig;
use crate::error::EditorError;
use crate::provider::{GenerationRequest, HttpImageProvider, ImageProvider, ProviderError};
use crate::storage::BlobStorage;

/// Parameter name under which an AI edit records its command.
pub const AI_COMMAND_PARAM: &str = "command";

/// Result of [`Editor::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Logical path of the stored image.
    pub path: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Result of [`Editor::preview_filter`].
#[derive(Debug, Clone)]
pub struct Preview {
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// Encoding of `bytes`.
    pub format: ImageFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Image editor backed by local storage.
pub struct Editor {
    registry: FilterRegistry,
    store: DerivationStore,
    storage: BlobStorage,
    provider: Option<Box<dyn ImageProvider>>,
    /// Paths with an apply in flight.
    applying: Mutex<BTreeSet<String>>,
    released: Condvar,
}

/// Exclusive right to apply filters to one path; released on drop.
struct PathClaim<'a> {
    editor: &'a Editor,
    path: String,
}

impl Drop for PathClaim<'_> {
    fn drop(&mut self) {
        self.editor.applying.lock().remove(&self.path);
        self.editor.released.notify_all();
    }
}

impl Editor {
    /// Editor over explicit collaborators, without an AI provider.
    #[must_use]
    pub const fn new(registry: FilterRegistry, store: DerivationStore, storage: BlobStorage) -> Self {
        Self {
            registry,
            store,
            storage,
            provider: None,
            applying: Mutex::new(BTreeSet::new()),
            released: Condvar::new(),
        }
    }

    /// Wait until no other apply is writing `path`, then claim it.
    fn claim(&self, path: &str) -> PathClaim<'_> {
        let mut applying = self.applying.lock();
        while applying.contains(path) {
            self.released.wait(&mut applying);
        }
        applying.insert(path.to_owned());
        PathClaim {
            editor: self,
            path: path.to_owned(),
        }
    }

    /// Editor with the built-in filters, the snapshot, storage and
    /// provider named by `config`.
    ///
    /// A missing API key is not an error here; AI operations fail with
    /// [`EditorError::ProviderNotConfigured`] until one is set.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Registry`] if the built-in filters collide,
    /// or [`EditorError::ExternalProviderError`] if the HTTP client
    /// cannot be built.
    pub fn from_config(config: &EditorConfig) -> Result<Self, EditorError> {
        let registry = FilterRegistry::builtin().map_err(EditorError::Registry)?;
        let store = DerivationStore::open(&config.snapshot_file);
        let storage = BlobStorage::new(&config.storage_root, &config.upload_dir);
        let editor = Self::new(registry, store, storage);
        match HttpImageProvider::new(&config.provider) {
            Ok(provider) => Ok(editor.with_provider(provider)),
            Err(ProviderError::NotConfigured) => {
                info!("no AI provider key configured, AI operations disabled");
                Ok(editor)
            }
            Err(e) => Err(EditorError::ExternalProviderError(e)),
        }
    }

    /// Use `provider` for AI operations.
    #[must_use]
    pub fn with_provider(mut self, provider: impl ImageProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// The derivation store.
    #[must_use]
    pub const fn store(&self) -> &DerivationStore {
        &self.store
    }

    /// The blob storage.
    #[must_use]
    pub const fn storage(&self) -> &BlobStorage {
        &self.storage
    }

    /// Store an uploaded image under a fresh name.
    ///
    /// The extension comes from `original_name` when it names an image
    /// format, else from the detected format, else `.png`.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidImage`] if `bytes` do not decode,
    /// or [`EditorError::Storage`] if they cannot be written.
    pub fn upload(&self, bytes: &[u8], original_name: &str) -> Result<Upload, EditorError> {
        let image = codec::decode(bytes).map_err(EditorError::InvalidImage)?;
        let extension = upload_extension(bytes, original_name);
        let path = self.storage.store_upload(bytes, &extension)?;
        info!(path = %path, original = original_name, "uploaded image");
        Ok(Upload {
            path,
            width: image.width(),
            height: image.height(),
        })
    }

    /// Apply `filter_name` to the image at `path` and return the path of
    /// the result.
    ///
    /// The root image is re-rendered with the whole recorded chain, so
    /// repeated applications never compound encoding loss. On failure
    /// after the derivation was recorded, the store is rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::UnknownFilter`], [`EditorError::PathNotFound`]
    /// if the root image is missing, [`EditorError::FilterApplicationFailed`]
    /// if the engine fails, or [`EditorError::Storage`].
    pub fn apply_filter(
        &self,
        path: &str,
        filter_name: &str,
        raw_parameters: &BTreeMap<String, String>,
    ) -> Result<String, EditorError> {
        let filter = self.applied(filter_name, raw_parameters)?;
        let new_path = path::filtered_path(path);
        let _claim = self.claim(&new_path);
        let recorded = self.store.record_derivation(&new_path, path, filter);

        let result = self
            .storage
            .read(&recorded.root)
            .map_err(EditorError::from)
            .and_then(|source| {
                retouch_filters::render(
                    &self.registry,
                    &source,
                    &recorded.chain,
                    codec::format_for_path(&new_path),
                )
                .map_err(EditorError::from_filter)
            })
            .and_then(|rendered| {
                self.storage.write(&new_path, &rendered.bytes)?;
                Ok(rendered)
            });

        match result {
            Ok(rendered) => {
                if !rendered.skipped.is_empty() {
                    warn!(path = %new_path, skipped = ?rendered.skipped, "chain entries not replayed");
                }
                info!(
                    path = %new_path,
                    root = %recorded.root,
                    filter = filter_name,
                    chain = recorded.chain.len(),
                    "applied filter"
                );
                Ok(new_path)
            }
            Err(e) => {
                warn!(path = %new_path, filter = filter_name, error = %e, "filter application failed");
                self.store.rollback(recorded.undo);
                Err(e)
            }
        }
    }

    /// Render `path` with `filter_name` appended to its chain, without
    /// recording anything.
    ///
    /// The result is encoded like `path` would be.
    ///
    /// # Errors
    ///
    /// Same as [`apply_filter`](Self::apply_filter).
    pub fn preview_filter(
        &self,
        path: &str,
        filter_name: &str,
        raw_parameters: &BTreeMap<String, String>,
    ) -> Result<Preview, EditorError> {
        let filter = self.applied(filter_name, raw_parameters)?;
        let (root, mut chain) = self.store.replay_plan(path);
        chain.push(filter);

        let source = self.storage.read(&root)?;
        let format = codec::format_for_path(path);
        let rendered = retouch_filters::render(&self.registry, &source, &chain, format)
            .map_err(EditorError::from_filter)?;
        Ok(Preview {
            bytes: rendered.bytes,
            format,
            width: rendered.width,
            height: rendered.height,
        })
    }

    /// Forget how `path` was derived and return its best-guess original.
    #[must_use]
    pub fn reset(&self, path: &str) -> String {
        let outcome = self.store.reset(&self.storage, path);
        info!(path, original = %outcome.path, tier = ?outcome.tier, "reset image");
        outcome.path
    }

    /// Filters recorded for `path`, in application order.
    #[must_use]
    pub fn applied_filters(&self, path: &str) -> Vec<AppliedFilter> {
        self.store.chain_for(path)
    }

    /// Registered filters, in registration order.
    #[must_use]
    pub fn available_filters(&self) -> Vec<FilterSpec> {
        self.registry.list()
    }

    /// Image `path` would be replayed from.
    #[must_use]
    pub fn resolve_root(&self, path: &str) -> String {
        self.store.resolve_root(path)
    }

    /// Generate a new image from `prompt`. The result is its own root.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::ProviderNotConfigured`], a provider error,
    /// [`EditorError::InvalidImage`] if the provider's bytes do not
    /// decode, or [`EditorError::Storage`].
    pub fn ai_generate(&self, prompt: &str) -> Result<String, EditorError> {
        let bytes = self.provider()?.generate(&GenerationRequest::generate(prompt))?;
        codec::decode(&bytes).map_err(EditorError::InvalidImage)?;
        let extension = detected_extension(&bytes).unwrap_or("png");
        let new_path = self
            .storage
            .upload_path(&format!("{}_generated.{extension}", uuid::Uuid::new_v4()));
        self.storage.write(&new_path, &bytes)?;
        info!(path = %new_path, "stored generated image");
        Ok(new_path)
    }

    /// Edit the image at `path` according to `command`.
    ///
    /// If `path` does not exist, the shortest upload sharing its file ID
    /// is used instead. The result is recorded as derived from the
    /// source's root with an `AI Edit` entry.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::PathNotFound`] if no source image can be
    /// found, and otherwise the errors of
    /// [`ai_generate`](Self::ai_generate).
    pub fn ai_edit(&self, path: &str, command: &str) -> Result<String, EditorError> {
        let provider = self.provider()?;
        let source_path = self.locate(path)?;
        let source = self.storage.read(&source_path)?;
        let jpeg = codec::decode(&source)
            .and_then(|image| codec::encode(&image, ImageFormat::Jpeg))
            .map_err(EditorError::InvalidImage)?;

        let result = provider.generate(&GenerationRequest::edit(command, jpeg))?;

        let new_path = ai_edit_path(&source_path, &chrono::Local::now());
        let image = codec::decode(&result).map_err(EditorError::InvalidImage)?;
        let bytes = codec::encode(&image, codec::format_for_path(&new_path))
            .map_err(EditorError::InvalidImage)?;
        self.storage.write(&new_path, &bytes)?;

        let parameters = Parameters::from([(
            AI_COMMAND_PARAM.to_owned(),
            ParamValue::Text(command.to_owned()),
        )]);
        let recorded = self.store.record_derivation(
            &new_path,
            &source_path,
            AppliedFilter::new(AI_EDIT_FILTER, parameters),
        );
        info!(path = %new_path, root = %recorded.root, "stored AI edit");
        Ok(new_path)
    }

    fn provider(&self) -> Result<&dyn ImageProvider, EditorError> {
        self.provider
            .as_deref()
            .ok_or_else(|| EditorError::from(ProviderError::NotConfigured))
    }

    /// Registry check plus parameter conversion.
    fn applied(
        &self,
        filter_name: &str,
        raw_parameters: &BTreeMap<String, String>,
    ) -> Result<AppliedFilter, EditorError> {
        if !self.registry.contains(filter_name) {
            return Err(EditorError::UnknownFilter(filter_name.to_owned()));
        }
        Ok(AppliedFilter::new(
            filter_name,
            convert_parameters(raw_parameters),
        ))
    }

    /// `path` if it exists, else the closest upload by file ID.
    fn locate(&self, path: &str) -> Result<String, EditorError> {
        if self.storage.exists(path) {
            return Ok(path::canonical(path));
        }
        path::file_id(path)
            .and_then(|id| self.storage.find_by_file_id(id))
            .inspect(|found| info!(path, found = %found, "using closest upload for missing image"))
            .ok_or_else(|| EditorError::PathNotFound(path.to_owned()))
    }
}

/// File extension (without dot) of the format `bytes` are encoded in.
fn detected_extension(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
}

fn upload_extension(bytes: &[u8], original_name: &str) -> String {
    let named = path::extension(original_name).to_lowercase();
    if named
        .strip_prefix('.')
        .is_some_and(|ext| ImageFormat::from_extension(ext).is_some())
    {
        return named;
    }
    format!(".{}", detected_extension(bytes).unwrap_or("png"))
}

/// `{dir}/{stem}_ai_{YYYYmmdd_HHMMSS}{ext}` next to `source`.
fn ai_edit_path<Tz: chrono::TimeZone>(source: &str, now: &chrono::DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let extension = match path::extension(source) {
        "" => ".png",
        ext => ext,
    };
    let name = format!(
        "{}_ai_{}{extension}",
        path::stem(source),
        now.format("%Y%m%d_%H%M%S")
    );
    path::canonical(&path::join(path::parent(source), &name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn ai_edit_names() {
        let now = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            ai_edit_path("/uploads/abc.jpg", &now),
            "/uploads/abc_ai_20240309_140507.jpg"
        );
        assert_eq!(
            ai_edit_path("uploads/x/abc_filtered.webp", &now),
            "/uploads/x/abc_filtered_ai_20240309_140507.webp"
        );
        assert_eq!(ai_edit_path("/u/noext", &now), "/u/noext_ai_20240309_140507.png");
    }

    #[test]
    fn upload_extension_prefers_known_name() {
        let png = {
            let image = image::DynamicImage::new_rgba8(1, 1);
            codec::encode(&image, ImageFormat::Png).unwrap()
        };
        assert_eq!(upload_extension(&png, "Photo.JPG"), ".jpg");
        assert_eq!(upload_extension(&png, "notes.txt"), ".png");
        assert_eq!(upload_extension(&png, "noext"), ".png");
        assert_eq!(upload_extension(b"", "noext"), ".png");
    }
}
