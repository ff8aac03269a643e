//! Error types for the token-store crate.

use std::fmt;

/// Errors from session-material storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing store could not be read or written.
    Io { reason: String },
    /// The backing store holds data that cannot be decoded.
    Corrupt { reason: String },
    /// The platform store is not available on this device.
    Unavailable { reason: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { reason } => write!(f, "storage I/O failed: {reason}"),
            Self::Corrupt { reason } => write!(f, "storage is corrupt: {reason}"),
            Self::Unavailable { reason } => write!(f, "storage unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt {
            reason: e.to_string(),
        }
    }
}
