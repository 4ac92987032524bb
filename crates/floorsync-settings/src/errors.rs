//! Settings error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Why loading settings failed.
///
/// File errors carry the path so the binary can tell the operator which
/// file to fix.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or its values do not fit the settings schema
    /// (e.g. `"port": "abc"`).
    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying JSON error, with line and column when available.
        #[source]
        source: serde_json::Error,
    },
    /// The compiled defaults could not be converted to JSON.
    #[error("failed to serialize default settings: {0}")]
    Defaults(#[source] serde_json::Error),
}

impl SettingsError {
    /// The settings file involved, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } => Some(path),
            Self::Defaults(_) => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
