//! # Design
//!
//! - Constant-message errors for the archive pipeline.
//! - Paths and operation names travel as fields so callers can map them to responses.
//! - Per-file failures never surface here; they become [`crate::Problem`] records.

use std::io;

use thiserror::Error;
use zipline_core::{FsPath, NamespaceError, TransferError};

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors that abort an archive request.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The requested directory does not exist.
    #[error("archive root not found")]
    NotFound {
        /// Requested root.
        path: FsPath,
    },
    /// The requested path is not a directory.
    #[error("archive root is not a directory")]
    NotADirectory {
        /// Requested root.
        path: FsPath,
    },
    /// The subject may not list the requested directory.
    #[error("archive root access denied")]
    PermissionDenied {
        /// Requested root.
        path: FsPath,
    },
    /// Resolving the root failed for another reason.
    #[error("archive namespace failure")]
    Namespace {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying namespace error.
        #[source]
        source: NamespaceError,
    },
    /// Writing to the client failed.
    #[error("archive output failure")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The ZIP encoder rejected an operation.
    #[error("archive encoding failure")]
    Zip {
        /// Operation that failed.
        operation: &'static str,
        /// Entry being written when available.
        path: Option<FsPath>,
        /// Underlying encoder error.
        #[source]
        source: zip::result::ZipError,
    },
    /// Reading file content from a mover failed mid-archive.
    #[error("archive relay failure")]
    Relay {
        /// File being relayed.
        path: FsPath,
        /// Underlying transfer error.
        #[source]
        source: TransferError,
    },
    /// A file resolved outside the archive root.
    #[error("archive entry outside root")]
    EntryOutsideRoot {
        /// Offending path.
        path: FsPath,
    },
    /// The request was cancelled before the archive completed.
    #[error("archive cancelled")]
    Cancelled,
    /// The writer task panicked or was aborted.
    #[error("archive writer task failed")]
    Join {
        /// Underlying join error.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl ArchiveError {
    /// Classify a failed root lookup.
    #[must_use]
    pub fn from_root_lookup(source: NamespaceError) -> Self {
        match source {
            NamespaceError::NotFound { path } => Self::NotFound { path },
            NamespaceError::NotADirectory { path } => Self::NotADirectory { path },
            NamespaceError::PermissionDenied { path } => Self::PermissionDenied { path },
            other => Self::Namespace {
                operation: "stat_root",
                source: other,
            },
        }
    }

    /// Outcome label used for request metrics.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            _ => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_lookup_classification() -> Result<(), zipline_core::PathError> {
        let path = FsPath::parse("/missing")?;
        assert!(matches!(
            ArchiveError::from_root_lookup(NamespaceError::NotFound { path: path.clone() }),
            ArchiveError::NotFound { .. }
        ));
        assert!(matches!(
            ArchiveError::from_root_lookup(NamespaceError::NotADirectory { path: path.clone() }),
            ArchiveError::NotADirectory { .. }
        ));
        assert!(matches!(
            ArchiveError::from_root_lookup(NamespaceError::Timeout { path }),
            ArchiveError::Namespace {
                operation: "stat_root",
                ..
            }
        ));
        assert_eq!(ArchiveError::Cancelled.outcome(), "cancelled");
        Ok(())
    }
}
