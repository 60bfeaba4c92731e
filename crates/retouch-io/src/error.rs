//! Errors surfaced by the editor.

use retouch_filters::FilterError;

use crate::provider::ProviderError;
use crate::storage::StorageError;

/// Errors returned by [`Editor`](crate::Editor) operations.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// The requested filter is not registered.
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    /// The referenced image does not exist in storage.
    #[error("image not found: {0}")]
    PathNotFound(String),

    /// The image engine failed while replaying a chain.
    #[error("filter application failed: {0}")]
    FilterApplicationFailed(#[source] FilterError),

    /// Uploaded or generated bytes are not a decodable image.
    #[error("not a valid image: {0}")]
    InvalidImage(#[source] FilterError),

    /// The AI provider returned an error.
    #[error("AI provider error: {0}")]
    ExternalProviderError(#[source] ProviderError),

    /// The AI provider did not finish within the polling budget.
    #[error("AI provider timed out after {attempts} status checks")]
    ExternalProviderTimeout {
        /// Status checks made.
        attempts: u32,
    },

    /// An AI operation was requested but no provider is configured.
    #[error("AI provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// Reading or writing image bytes failed.
    #[error(transparent)]
    Storage(StorageError),

    /// The built-in filter set could not be registered.
    #[error("filter registry: {0}")]
    Registry(#[source] FilterError),
}

impl From<ProviderError> for EditorError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::TimedOut { attempts } => Self::ExternalProviderTimeout { attempts },
            ProviderError::NotConfigured => Self::ProviderNotConfigured(err.to_string()),
            other => Self::ExternalProviderError(other),
        }
    }
}

impl From<StorageError> for EditorError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => Self::PathNotFound(path),
            other => Self::Storage(other),
        }
    }
}

impl EditorError {
    /// Map an engine error raised while running filters.
    pub(crate) fn from_filter(err: FilterError) -> Self {
        match err {
            FilterError::UnknownFilter(name) => Self::UnknownFilter(name),
            other => Self::FilterApplicationFailed(other),
        }
    }

    /// Whether the caller, not the system, is at fault.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownFilter(_)
                | Self::PathNotFound(_)
                | Self::InvalidImage(_)
                | Self::ProviderNotConfigured(_)
        )
    }
}
