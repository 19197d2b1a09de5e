//! Content error types.

use super::storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or mutating content.
#[derive(Debug, Error)]
pub enum ContentError {
    /// A content file has malformed front matter or an invalid field.
    #[error("failed to parse `{path}`: {message}")]
    Parse { path: PathBuf, message: String },

    /// A content file could not be read.
    #[error("failed to read `{path}`")]
    Read {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    /// Two source files resolve to the same identity path.
    #[error("`{path}` is defined by both `{first}` and `{second}`")]
    DuplicatePath {
        path: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A write lost a race or targeted a stale version.
    #[error("write conflict on `{path}`: {reason}")]
    WriteConflict { path: String, reason: String },

    #[error("no document at `{0}`")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ContentError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn conflict(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteConflict {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Source file the error is about, when known.
    pub fn source_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Parse { path, .. } | Self::Read { path, .. } => Some(path),
            Self::DuplicatePath { second, .. } => Some(second),
            _ => None,
        }
    }
}
