//! retouch-io: The editor service and its outside-world collaborators.
//!
//! [`Editor`] is the entry point: upload, apply, preview, reset, list
//! and the AI operations all go through it. It is built from an
//! [`EditorConfig`] and talks to:
//!
//! - [`BlobStorage`]: image bytes under a local directory.
//! - [`retouch_store::DerivationStore`]: which image came from which.
//! - [`ImageProvider`]: an optional AI generation service.
//!
//! Everything here blocks; callers that serve concurrent requests run
//! each operation on its own thread.

pub mod config;
pub mod editor;
pub mod error;
pub mod provider;
pub mod storage;

pub use config::{ConfigError, EditorConfig, ProviderConfig};
pub use editor::{AI_COMMAND_PARAM, Editor, Preview, Upload};
pub use error::EditorError;
pub use provider::{
    GenerationRequest, HttpImageProvider, ImageProvider, PollObservation, PollState, ProviderError,
};
pub use storage::{BlobStorage, StorageError};
