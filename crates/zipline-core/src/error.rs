//! Error types for namespace and transfer services.

use std::error::Error;
use std::time::Duration;

use thiserror::Error;

use crate::model::FsPath;

/// Failure raised while parsing a namespace path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// The path was empty.
    #[error("path is empty")]
    Empty,
    /// The path did not start at the namespace root.
    #[error("path must be absolute")]
    Relative {
        /// Rejected input.
        value: String,
    },
    /// The path contained a `.` or `..` segment.
    #[error("path contains a relative segment")]
    RelativeSegment {
        /// Rejected input.
        value: String,
    },
    /// The path contained a NUL byte.
    #[error("path contains a nul byte")]
    Nul,
}

/// Errors reported by the namespace (listing) service.
#[derive(Debug, Error)]
pub enum NamespaceError {
    /// The path does not exist.
    #[error("namespace entry not found")]
    NotFound {
        /// Missing path.
        path: FsPath,
    },
    /// The operation required a directory.
    #[error("namespace entry is not a directory")]
    NotADirectory {
        /// Offending path.
        path: FsPath,
    },
    /// The subject may not access the path.
    #[error("namespace access denied")]
    PermissionDenied {
        /// Protected path.
        path: FsPath,
    },
    /// The namespace did not answer in time.
    #[error("namespace request timed out")]
    Timeout {
        /// Path being resolved.
        path: FsPath,
    },
    /// Any other backend failure.
    #[error("namespace operation failed")]
    Other {
        /// Operation identifier.
        operation: &'static str,
        /// Path being resolved.
        path: FsPath,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl NamespaceError {
    /// Path the failure relates to.
    #[must_use]
    pub const fn path(&self) -> &FsPath {
        match self {
            Self::NotFound { path }
            | Self::NotADirectory { path }
            | Self::PermissionDenied { path }
            | Self::Timeout { path }
            | Self::Other { path, .. } => path,
        }
    }

    /// Stable label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::NotADirectory { .. } => "not_a_directory",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Timeout { .. } => "timeout",
            Self::Other { .. } => "other",
        }
    }
}

/// Errors reported by the transfer (mover) subsystem.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The file vanished before the transfer started.
    #[error("transfer source not found")]
    NotFound {
        /// Missing path.
        path: FsPath,
    },
    /// A transfer for the same target already exists.
    #[error("transfer already exists")]
    AlreadyExists {
        /// Conflicting path.
        path: FsPath,
    },
    /// The subject may not read the file.
    #[error("transfer permission denied")]
    PermissionDenied {
        /// Protected path.
        path: FsPath,
    },
    /// No mover became ready in time.
    #[error("transfer timed out")]
    Timeout {
        /// Path being transferred.
        path: FsPath,
        /// Time spent waiting.
        waited: Duration,
    },
    /// The file is locked by another operation.
    #[error("transfer source is locked")]
    Locked {
        /// Locked path.
        path: FsPath,
    },
    /// The target is not a regular file.
    #[error("transfer source is not a file")]
    NotAFile {
        /// Offending path.
        path: FsPath,
    },
    /// Any other mover failure.
    #[error("transfer operation failed")]
    Other {
        /// Operation identifier.
        operation: &'static str,
        /// Path being transferred.
        path: FsPath,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl TransferError {
    /// Path the failure relates to.
    #[must_use]
    pub const fn path(&self) -> &FsPath {
        match self {
            Self::NotFound { path }
            | Self::AlreadyExists { path }
            | Self::PermissionDenied { path }
            | Self::Timeout { path, .. }
            | Self::Locked { path }
            | Self::NotAFile { path }
            | Self::Other { path, .. } => path,
        }
    }

    /// Stable label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Timeout { .. } => "timeout",
            Self::Locked { .. } => "locked",
            Self::NotAFile { .. } => "not_a_file",
            Self::Other { .. } => "other",
        }
    }

    /// Wrap an arbitrary failure raised by a mover for `path`.
    pub fn other(
        operation: &'static str,
        path: FsPath,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::Other {
            operation,
            path,
            source: source.into(),
        }
    }
}

/// Convenience alias for namespace results.
pub type NamespaceResult<T> = Result<T, NamespaceError>;

/// Convenience alias for transfer results.
pub type TransferResult<T> = Result<T, TransferError>;
