//! Metadata and error conversion between `std`/`tokio::fs` and core types.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use zipline_core::{FileAttributes, FsPath, NamespaceError, TransferError};

/// Map a namespace path onto `root`.
pub(crate) fn resolve(root: &Path, path: &FsPath) -> PathBuf {
    let mut resolved = root.to_path_buf();
    for segment in path.segments() {
        resolved.push(segment);
    }
    resolved
}

pub(crate) fn attributes(metadata: &Metadata) -> FileAttributes {
    let file_type = metadata.file_type();
    let base = if file_type.is_symlink() {
        FileAttributes::link()
    } else if file_type.is_dir() {
        FileAttributes::directory()
    } else if file_type.is_file() {
        FileAttributes::regular(metadata.len())
    } else {
        FileAttributes::special()
    };
    let base = base.with_times(
        metadata.created().ok().map(DateTime::<Utc>::from),
        metadata.accessed().ok().map(DateTime::<Utc>::from),
        metadata.modified().ok().map(DateTime::<Utc>::from),
    );
    with_ownership(base, metadata)
}

#[cfg(unix)]
fn with_ownership(attributes: FileAttributes, metadata: &Metadata) -> FileAttributes {
    use std::os::unix::fs::MetadataExt;

    attributes
        .with_mode(metadata.mode() & 0o7777)
        .with_owner(metadata.uid(), metadata.gid())
}

#[cfg(not(unix))]
fn with_ownership(attributes: FileAttributes, _metadata: &Metadata) -> FileAttributes {
    attributes
}

pub(crate) fn namespace_error(
    operation: &'static str,
    path: &FsPath,
    source: io::Error,
) -> NamespaceError {
    let path = path.clone();
    match source.kind() {
        io::ErrorKind::NotFound => NamespaceError::NotFound { path },
        io::ErrorKind::PermissionDenied => NamespaceError::PermissionDenied { path },
        io::ErrorKind::NotADirectory => NamespaceError::NotADirectory { path },
        io::ErrorKind::TimedOut => NamespaceError::Timeout { path },
        _ => NamespaceError::Other {
            operation,
            path,
            source: Box::new(source),
        },
    }
}

pub(crate) fn transfer_error(
    operation: &'static str,
    path: &FsPath,
    source: io::Error,
) -> TransferError {
    let path = path.clone();
    match source.kind() {
        io::ErrorKind::NotFound => TransferError::NotFound { path },
        io::ErrorKind::PermissionDenied => TransferError::PermissionDenied { path },
        _ => TransferError::other(operation, path, source),
    }
}
