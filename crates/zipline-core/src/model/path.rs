//! Normalised absolute namespace paths.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PathError;

/// Absolute, normalised path inside the namespace (`/a/b`).
///
/// Duplicate and trailing separators are collapsed on parse; `.` and `..`
/// segments are rejected rather than resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FsPath(String);

impl FsPath {
    /// The namespace root (`/`).
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and normalise a namespace path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when the input is empty, relative, contains a
    /// NUL byte or a `.`/`..` segment.
    pub fn parse(value: &str) -> Result<Self, PathError> {
        if value.is_empty() {
            return Err(PathError::Empty);
        }
        if value.contains('\0') {
            return Err(PathError::Nul);
        }
        if !value.starts_with('/') {
            return Err(PathError::Relative {
                value: value.to_string(),
            });
        }

        let mut normalised = String::with_capacity(value.len());
        for segment in value.split('/').filter(|segment| !segment.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(PathError::RelativeSegment {
                    value: value.to_string(),
                });
            }
            normalised.push('/');
            normalised.push_str(segment);
        }
        if normalised.is_empty() {
            normalised.push('/');
        }
        Ok(Self(normalised))
    }

    /// Whether this is the namespace root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Borrow the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component, `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    /// Parent directory, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(index) => Some(Self(self.0[..index].to_string())),
            None => None,
        }
    }

    /// Append a single child component.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when `name` is not a valid single component.
    pub fn join(&self, name: &str) -> Result<Self, PathError> {
        if name.contains('/') || name == "." || name == ".." || name.is_empty() {
            return Err(PathError::RelativeSegment {
                value: name.to_string(),
            });
        }
        if name.contains('\0') {
            return Err(PathError::Nul);
        }
        let mut joined = self.0.clone();
        if !self.is_root() {
            joined.push('/');
        }
        joined.push_str(name);
        Ok(Self(joined))
    }

    /// Iterate over the path components.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Express this path relative to `base` using `/` separators.
    ///
    /// Returns `None` when the path is not strictly below `base`.
    #[must_use]
    pub fn relative_to(&self, base: &Self) -> Option<String> {
        let rest = if base.is_root() {
            self.0.strip_prefix('/')?
        } else {
            self.0.strip_prefix(base.as_str())?.strip_prefix('/')?
        };
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}

impl Display for FsPath {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for FsPath {
    type Err = PathError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for FsPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FsPath> for String {
    fn from(path: FsPath) -> Self {
        path.0
    }
}

impl AsRef<str> for FsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
