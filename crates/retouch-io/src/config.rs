//! Editor configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an
//! optional JSON file, and environment variables. Every field has a
//! default, so a config file only needs the keys it changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// API key for the AI provider.
pub const API_KEY_ENV: &str = "IMAGE_API_KEY";
/// Overrides [`EditorConfig::storage_root`].
pub const STORAGE_ROOT_ENV: &str = "RETOUCH_STORAGE_ROOT";
/// Overrides [`EditorConfig::snapshot_file`].
pub const SNAPSHOT_FILE_ENV: &str = "RETOUCH_SNAPSHOT_FILE";
/// Overrides [`ProviderConfig::base_url`].
pub const PROVIDER_URL_ENV: &str = "RETOUCH_PROVIDER_URL";

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON.
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Top-level editor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Directory that logical `/…` paths resolve against.
    pub storage_root: PathBuf,

    /// Directory under the storage root that receives uploads, AI
    /// output and the originals searched for by reset.
    pub upload_dir: String,

    /// Derivation snapshot file. Relative paths resolve against the
    /// current directory.
    pub snapshot_file: PathBuf,

    /// AI provider settings.
    pub provider: ProviderConfig,
}

impl EditorConfig {
    /// Default for [`storage_root`](Self::storage_root).
    pub const DEFAULT_STORAGE_ROOT: &str = "wwwroot";
    /// Default for [`upload_dir`](Self::upload_dir).
    pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
    /// Default for [`snapshot_file`](Self::snapshot_file).
    pub const DEFAULT_SNAPSHOT_FILE: &str = "filters_data.json";

    /// Defaults, then `file` if given, then the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `file` exists but cannot be read or
    /// parsed. A missing file leaves the defaults in place.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a JSON config file.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Apply overrides from `lookup` (normally the environment).
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = get(API_KEY_ENV) {
            self.provider.api_key = Some(key.trim().to_owned());
        }
        if let Some(root) = get(STORAGE_ROOT_ENV) {
            self.storage_root = PathBuf::from(root);
        }
        if let Some(file) = get(SNAPSHOT_FILE_ENV) {
            self.snapshot_file = PathBuf::from(file);
        }
        if let Some(url) = get(PROVIDER_URL_ENV) {
            self.provider.base_url = url;
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from(Self::DEFAULT_STORAGE_ROOT),
            upload_dir: Self::DEFAULT_UPLOAD_DIR.to_owned(),
            snapshot_file: PathBuf::from(Self::DEFAULT_SNAPSHOT_FILE),
            provider: ProviderConfig::default(),
        }
    }
}

/// AI provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Scheme and host of the provider API, without a trailing path.
    pub base_url: String,

    /// Bearer token. AI operations fail with a configuration error
    /// while this is unset.
    pub api_key: Option<String>,

    /// Status polls before giving up.
    pub poll_attempts: u32,

    /// Seconds between status polls.
    pub poll_delay_secs: u64,

    /// Timeout for each HTTP request, in seconds.
    pub request_timeout_secs: u64,

    /// Sent with every generation request.
    pub negative_prompt: String,

    /// Requested aspect ratio, e.g. `1:1`.
    pub size: String,
}

impl ProviderConfig {
    /// Default for [`base_url`](Self::base_url).
    pub const DEFAULT_BASE_URL: &str = "https://4oimageapiio.erweima.ai";
    /// Default for [`poll_attempts`](Self::poll_attempts).
    pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;
    /// Default for [`poll_delay_secs`](Self::poll_delay_secs).
    pub const DEFAULT_POLL_DELAY_SECS: u64 = 10;
    /// Default for [`request_timeout_secs`](Self::request_timeout_secs).
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;
    /// Default for [`negative_prompt`](Self::negative_prompt).
    pub const DEFAULT_NEGATIVE_PROMPT: &str = "low quality, blurry, distorted";
    /// Default for [`size`](Self::size).
    pub const DEFAULT_SIZE: &str = "1:1";

    /// [`poll_delay_secs`](Self::poll_delay_secs) as a duration.
    #[must_use]
    pub const fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_secs)
    }

    /// [`request_timeout_secs`](Self::request_timeout_secs) as a duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            api_key: None,
            poll_attempts: Self::DEFAULT_POLL_ATTEMPTS,
            poll_delay_secs: Self::DEFAULT_POLL_DELAY_SECS,
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            negative_prompt: Self::DEFAULT_NEGATIVE_PROMPT.to_owned(),
            size: Self::DEFAULT_SIZE.to_owned(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retouch.json");
        fs::write(&path, r#"{"upload_dir": "media", "provider": {"poll_attempts": 3}}"#).unwrap();

        let config = EditorConfig::from_file(&path).unwrap();
        assert_eq!(config.upload_dir, "media");
        assert_eq!(config.provider.poll_attempts, 3);
        assert_eq!(config.storage_root, PathBuf::from("wwwroot"));
        assert_eq!(
            config.provider.poll_delay_secs,
            ProviderConfig::DEFAULT_POLL_DELAY_SECS
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retouch.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            EditorConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EditorConfig::from_file(&dir.path().join("absent.json"));
        assert!(matches!(config, Err(ConfigError::Read { .. })));

        let mut expected = EditorConfig::default();
        expected.apply_overrides(|name| std::env::var(name).ok());
        let loaded = EditorConfig::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(loaded, expected);
    }

    #[test]
    fn overrides_take_precedence() {
        let env: HashMap<&str, &str> = HashMap::from([
            (API_KEY_ENV, " secret "),
            (STORAGE_ROOT_ENV, "/srv/images"),
            (SNAPSHOT_FILE_ENV, ""),
        ]);
        let mut config = EditorConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| (*v).to_owned()));

        assert_eq!(config.provider.api_key.as_deref(), Some("secret"));
        assert_eq!(config.storage_root, PathBuf::from("/srv/images"));
        // Empty values do not override.
        assert_eq!(config.snapshot_file, PathBuf::from("filters_data.json"));
        assert_eq!(config.provider.base_url, ProviderConfig::DEFAULT_BASE_URL);
    }
}
