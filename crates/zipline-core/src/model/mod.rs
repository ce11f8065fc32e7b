//! Namespace domain types shared across the workspace.

mod path;

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use path::FsPath;

/// Authenticated caller on whose behalf namespace and transfer operations run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Numeric user identifier.
    pub uid: u32,
    /// Group memberships; the first entry is the primary group.
    pub gids: Vec<u32>,
    /// Optional display name for logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Identifier of the unprivileged fallback account.
pub const NOBODY_ID: u32 = 65_534;

impl Subject {
    #[must_use]
    /// Construct a subject from its numeric identity.
    pub fn new(uid: u32, gids: impl Into<Vec<u32>>) -> Self {
        Self {
            uid,
            gids: gids.into(),
            name: None,
        }
    }

    #[must_use]
    /// The superuser, which may read everything.
    pub fn root() -> Self {
        Self {
            uid: 0,
            gids: vec![0],
            name: Some("root".to_string()),
        }
    }

    #[must_use]
    /// The anonymous subject.
    pub fn nobody() -> Self {
        Self {
            uid: NOBODY_ID,
            gids: vec![NOBODY_ID],
            name: Some("nobody".to_string()),
        }
    }

    #[must_use]
    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether the subject bypasses permission checks.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.uid == 0
    }

    /// Whether the subject belongs to `gid`.
    #[must_use]
    pub fn in_group(&self, gid: u32) -> bool {
        self.gids.contains(&gid)
    }
}

impl Display for Subject {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(formatter, "{name}({})", self.uid),
            None => write!(formatter, "uid:{}", self.uid),
        }
    }
}

/// Kind of namespace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Regular data file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Link,
    /// Device, socket, fifo or any other special entry.
    Special,
}

/// Attribute a caller may request from the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAttribute {
    /// Entry type.
    Type,
    /// Size in bytes.
    Size,
    /// POSIX permission bits.
    Mode,
    /// Owning user.
    Owner,
    /// Owning group.
    OwnerGroup,
    /// Creation time.
    CreationTime,
    /// Last access time.
    AccessTime,
    /// Last modification time.
    ModificationTime,
    /// Namespace-internal identifier.
    Id,
}

/// Ordered set of requested attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet(BTreeSet<FileAttribute>);

impl AttributeSet {
    /// Empty attribute set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// Build a set from any iterator of attributes.
    pub fn of(attributes: impl IntoIterator<Item = FileAttribute>) -> Self {
        Self(attributes.into_iter().collect())
    }

    /// Union with another set.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// Whether the set contains `attribute`.
    #[must_use]
    pub fn contains(&self, attribute: FileAttribute) -> bool {
        self.0.contains(&attribute)
    }

    /// Number of attributes in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the attributes in order.
    pub fn iter(&self) -> impl Iterator<Item = FileAttribute> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<FileAttribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = FileAttribute>>(iter: I) -> Self {
        Self::of(iter)
    }
}

/// Metadata describing one namespace entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// Entry type.
    pub file_type: FileType,
    /// Size in bytes; zero for non-regular entries.
    pub size: u64,
    /// POSIX permission bits when known.
    pub mode: Option<u32>,
    /// Owning uid when known.
    pub owner: Option<u32>,
    /// Owning gid when known.
    pub group: Option<u32>,
    /// Creation time when known.
    pub creation_time: Option<DateTime<Utc>>,
    /// Last access time when known.
    pub access_time: Option<DateTime<Utc>>,
    /// Last modification time when known.
    pub modification_time: Option<DateTime<Utc>>,
    /// Namespace-internal identifier when known.
    pub id: Option<String>,
}

impl FileAttributes {
    fn bare(file_type: FileType, size: u64) -> Self {
        Self {
            file_type,
            size,
            mode: None,
            owner: None,
            group: None,
            creation_time: None,
            access_time: None,
            modification_time: None,
            id: None,
        }
    }

    #[must_use]
    /// Attributes for a regular file of `size` bytes.
    pub fn regular(size: u64) -> Self {
        Self::bare(FileType::Regular, size)
    }

    #[must_use]
    /// Attributes for a directory.
    pub fn directory() -> Self {
        Self::bare(FileType::Directory, 0)
    }

    #[must_use]
    /// Attributes for a symbolic link.
    pub fn link() -> Self {
        Self::bare(FileType::Link, 0)
    }

    #[must_use]
    /// Attributes for a special entry.
    pub fn special() -> Self {
        Self::bare(FileType::Special, 0)
    }

    #[must_use]
    /// Set POSIX permission bits.
    pub const fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    /// Set owning user and group.
    pub const fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.owner = Some(uid);
        self.group = Some(gid);
        self
    }

    #[must_use]
    /// Set all three timestamps.
    pub const fn with_times(
        mut self,
        creation: Option<DateTime<Utc>>,
        access: Option<DateTime<Utc>>,
        modification: Option<DateTime<Utc>>,
    ) -> Self {
        self.creation_time = creation;
        self.access_time = access;
        self.modification_time = modification;
        self
    }

    /// Whether the entry is a regular file.
    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.file_type == FileType::Regular
    }

    /// Whether the entry is a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// Child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name relative to the listed directory.
    pub name: String,
    /// Entry metadata.
    pub attributes: FileAttributes,
}

impl DirectoryEntry {
    #[must_use]
    /// Pair a name with its attributes.
    pub fn new(name: impl Into<String>, attributes: FileAttributes) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }
}

/// Network location reported once a mover's data channel is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectTarget(String);

impl RedirectTarget {
    #[must_use]
    /// Wrap an opaque location string.
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Borrow the location.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RedirectTarget {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Identifier of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(pub Uuid);

impl TransferId {
    #[must_use]
    /// Allocate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TransferId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, formatter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_set_union_is_ordered() {
        let left = AttributeSet::of([FileAttribute::Size, FileAttribute::Type]);
        let right = AttributeSet::of([FileAttribute::Id, FileAttribute::Size]);
        let merged = left.union(&right);
        assert_eq!(merged.len(), 3);
        assert_eq!(
            merged.iter().collect::<Vec<_>>(),
            vec![FileAttribute::Type, FileAttribute::Size, FileAttribute::Id]
        );
        assert!(AttributeSet::empty().is_empty());
    }

    #[test]
    fn subject_helpers() {
        assert!(Subject::root().is_root());
        assert!(!Subject::nobody().is_root());
        let user = Subject::new(1000, vec![100, 200]).with_name("alice");
        assert!(user.in_group(200));
        assert!(!user.in_group(300));
        assert_eq!(user.to_string(), "alice(1000)");
        assert_eq!(Subject::new(7, vec![7]).to_string(), "uid:7");
    }

    #[test]
    fn file_attribute_builders() {
        let attrs = FileAttributes::regular(10)
            .with_mode(0o640)
            .with_owner(1, 2);
        assert!(attrs.is_regular());
        assert_eq!(attrs.mode, Some(0o640));
        assert_eq!((attrs.owner, attrs.group), (Some(1), Some(2)));
        assert!(FileAttributes::directory().is_directory());
        assert_eq!(FileAttributes::link().file_type, FileType::Link);
    }
}
