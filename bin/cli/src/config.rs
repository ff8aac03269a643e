//! Client configuration.
//!
//! Loaded via the `config` crate from an optional TOML file and from
//! environment variables prefixed `RAFFLEKIT` with `__` separators, e.g.
//! `RAFFLEKIT__API__BASE_URL`. Environment values override the file.

use rafflekit_gateway::{ApiConfig, ModulesConfig, SessionConfig};
use rafflekit_token_store::{FileBackend, TokenStore};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Errors from loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    Load { reason: String },
    /// A value was read but is not usable.
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { reason } => write!(f, "failed to load configuration: {reason}"),
            Self::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        Self::Load {
            reason: e.to_string(),
        }
    }
}

/// Client configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Remote API.
    pub api: ApiConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub modules: ModulesConfig,
}

/// Where session material is kept on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding both storage files.
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,

    /// File for tokens and the user profile (owner-only permissions).
    #[serde(default = "default_secure_file")]
    pub secure_file: String,

    /// File for non-sensitive flags.
    #[serde(default = "default_plaintext_file")]
    pub plaintext_file: String,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".rafflekit")
}

fn default_secure_file() -> String {
    "secure.json".to_string()
}

fn default_plaintext_file() -> String {
    "prefs.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            secure_file: default_secure_file(),
            plaintext_file: default_plaintext_file(),
        }
    }
}

impl StorageConfig {
    /// Opens a token store over the configured files.
    #[must_use]
    pub fn open_store(&self) -> TokenStore {
        TokenStore::new(
            Arc::new(FileBackend::new(self.dir.join(&self.secure_file))),
            Arc::new(FileBackend::new(self.dir.join(&self.plaintext_file))),
        )
    }
}

impl ClientConfig {
    /// Loads configuration from `file` (if given) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("RAFFLEKIT")
                .separator("__")
                .try_parsing(true),
        );
        Self::from_config(builder.build()?)
    }

    fn from_config(config: config::Config) -> Result<Self, ConfigError> {
        let parsed: Self = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "api.base_url",
                reason: format!("expected an http(s) URL, got {base_url:?}"),
            });
        }
        if self.api.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "api.request_timeout_seconds",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
