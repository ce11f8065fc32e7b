//! Namespace view of a directory on local disk.
//!
//! # Design
//! - Symbolic links are reported as links and never followed.
//! - Listings are sorted by name.
//! - Entries that vanish or have non-UTF-8 names between `read_dir` and `stat` are skipped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use zipline_core::{
    AttributeSet, DirectoryEntry, FileAttributes, FsPath, NamespaceError, NamespaceResult,
    NamespaceService, Subject,
};

use crate::convert::{attributes, namespace_error, resolve};

/// Namespace rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalNamespace {
    root: PathBuf,
}

impl LocalNamespace {
    /// Serve the tree below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory backing the namespace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl NamespaceService for LocalNamespace {
    async fn stat(
        &self,
        _subject: &Subject,
        path: &FsPath,
        _required: &AttributeSet,
    ) -> NamespaceResult<FileAttributes> {
        let metadata = tokio::fs::symlink_metadata(resolve(&self.root, path))
            .await
            .map_err(|source| namespace_error("stat", path, source))?;
        Ok(attributes(&metadata))
    }

    async fn list(
        &self,
        subject: &Subject,
        path: &FsPath,
        required: &AttributeSet,
    ) -> NamespaceResult<Vec<DirectoryEntry>> {
        if !self.stat(subject, path, required).await?.is_directory() {
            return Err(NamespaceError::NotADirectory { path: path.clone() });
        }
        let mut reader = tokio::fs::read_dir(resolve(&self.root, path))
            .await
            .map_err(|source| namespace_error("read_dir", path, source))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|source| namespace_error("read_dir", path, source))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                warn!(directory = %path, "skipping entry with non-UTF-8 name");
                continue;
            };
            match tokio::fs::symlink_metadata(entry.path()).await {
                Ok(metadata) => entries.push(DirectoryEntry::new(name, attributes(&metadata))),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(directory = %path, name = %name, "entry vanished during listing");
                }
                Err(err) => return Err(namespace_error("stat_entry", path, err)),
            }
        }
        entries.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipline_core::FileType;

    fn namespace() -> anyhow::Result<(tempfile::TempDir, LocalNamespace)> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("a/b"))?;
        std::fs::write(dir.path().join("a/zeta"), b"zz")?;
        std::fs::write(dir.path().join("a/alpha"), b"0123456789")?;
        std::fs::write(dir.path().join("a/b/f2"), b"f2")?;
        let namespace = LocalNamespace::new(dir.path());
        Ok((dir, namespace))
    }

    #[tokio::test]
    async fn list_is_sorted_and_typed() -> anyhow::Result<()> {
        let (_dir, namespace) = namespace()?;
        let entries = namespace
            .list(&Subject::root(), &FsPath::parse("/a")?, &AttributeSet::empty())
            .await?;
        let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["alpha", "b", "zeta"]);
        assert_eq!(entries[0].attributes.file_type, FileType::Regular);
        assert_eq!(entries[0].attributes.size, 10);
        assert!(entries[0].attributes.modification_time.is_some());
        assert_eq!(entries[1].attributes.file_type, FileType::Directory);
        Ok(())
    }

    #[tokio::test]
    async fn missing_and_non_directory_paths() -> anyhow::Result<()> {
        let (_dir, namespace) = namespace()?;
        let subject = Subject::root();
        let none = AttributeSet::empty();

        let missing = namespace
            .stat(&subject, &FsPath::parse("/nope")?, &none)
            .await;
        assert!(matches!(missing, Err(NamespaceError::NotFound { .. })));

        let file = namespace
            .list(&subject, &FsPath::parse("/a/alpha")?, &none)
            .await;
        assert!(matches!(file, Err(NamespaceError::NotADirectory { .. })));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_not_followed() -> anyhow::Result<()> {
        let (dir, namespace) = namespace()?;
        std::os::unix::fs::symlink(dir.path().join("a/alpha"), dir.path().join("a/link"))?;
        let attributes = namespace
            .stat(
                &Subject::root(),
                &FsPath::parse("/a/link")?,
                &AttributeSet::empty(),
            )
            .await?;
        assert_eq!(attributes.file_type, FileType::Link);
        assert!(attributes.mode.is_some());
        Ok(())
    }
}
