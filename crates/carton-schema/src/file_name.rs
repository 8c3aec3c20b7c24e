//! Case-insensitive archive entry names.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced when a string cannot be used as a [`FileName`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileNameError {
    /// The name was empty after normalization.
    #[error("file name is empty")]
    Empty,

    /// The name contains an empty, `.` or `..` segment.
    #[error("invalid segment in file name '{0}'")]
    InvalidSegment(String),

    /// A filesystem path could not be expressed as a name (non UTF-8 or absolute).
    #[error("path cannot be used as a file name: {0}")]
    UnsupportedPath(String),
}

/// A path-like key for an archive entry.
///
/// Separators are normalized to `/` and a leading `/` is dropped. Equality,
/// ordering and hashing ignore case, so `lib/App.jar` and `LIB/app.JAR` are
/// the same key; the original casing is kept for display and for the names
/// written to disk.
#[derive(Debug, Clone)]
pub struct FileName(String);

impl FileName {
    /// Parse and normalize a name.
    ///
    /// # Errors
    ///
    /// Returns [`FileNameError`] for empty names or names containing empty,
    /// `.` or `..` segments.
    pub fn new(name: &str) -> Result<Self, FileNameError> {
        let normalized = name.replace('\\', "/");
        let trimmed = normalized.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(FileNameError::Empty);
        }
        if trimmed
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(FileNameError::InvalidSegment(name.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Build a name from a relative filesystem path, joining components with `/`.
    ///
    /// # Errors
    ///
    /// Returns [`FileNameError::UnsupportedPath`] for absolute paths, parent
    /// references or components that are not valid UTF-8.
    pub fn from_relative_path(path: &Path) -> Result<Self, FileNameError> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| {
                        FileNameError::UnsupportedPath(path.display().to_string())
                    })?;
                    segments.push(part);
                }
                Component::CurDir => {}
                _ => return Err(FileNameError::UnsupportedPath(path.display().to_string())),
            }
        }
        Self::new(&segments.join("/"))
    }

    /// The name with its original casing.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last `/`-separated segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The name as a relative path using the platform separator.
    pub fn to_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }

    /// Case-insensitive comparison against a raw string.
    pub fn matches(&self, other: &str) -> bool {
        let other = other.replace('\\', "/");
        cmp_folded(&self.0, other.trim_start_matches('/')) == Ordering::Equal
    }

    fn folded(&self) -> impl Iterator<Item = char> + '_ {
        self.0.chars().flat_map(char::to_lowercase)
    }
}

fn cmp_folded(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

impl PartialEq for FileName {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FileName {}

impl Ord for FileName {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_folded(&self.0, &other.0)
    }
}

impl PartialOrd for FileName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for FileName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.folded() {
            c.hash(state);
        }
    }
}

impl std::fmt::Display for FileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for FileName {
    type Err = FileNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for FileName {
    type Error = FileNameError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl Serialize for FileName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for FileName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    #[test]
    fn equality_ignores_case_but_display_keeps_it() {
        let a = FileName::new("lib/File.jar").unwrap();
        let b = FileName::new("LIB/FILE.jar").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "lib/File.jar");
        assert_eq!(b.as_str(), "LIB/FILE.jar");
    }

    #[test]
    fn hash_and_ordering_agree_with_equality() {
        let mut set = HashSet::new();
        set.insert(FileName::new("meta/Icon.png").unwrap());
        assert!(!set.insert(FileName::new("META/icon.PNG").unwrap()));

        let ordered: BTreeSet<_> = ["b.jar", "A.jar", "c.jar"]
            .iter()
            .map(|n| FileName::new(n).unwrap())
            .collect();
        let names: Vec<_> = ordered.iter().map(FileName::as_str).collect();
        assert_eq!(names, vec!["A.jar", "b.jar", "c.jar"]);
    }

    #[test]
    fn separators_are_normalized() {
        let name = FileName::new("\\lib\\win\\native.dll").unwrap();
        assert_eq!(name.as_str(), "lib/win/native.dll");
        assert_eq!(name.file_name(), "native.dll");
        assert!(name.matches("LIB/WIN/NATIVE.DLL"));
    }

    #[test]
    fn rejects_traversal_and_empty_names() {
        assert_eq!(FileName::new(""), Err(FileNameError::Empty));
        assert_eq!(FileName::new("/"), Err(FileNameError::Empty));
        assert!(matches!(
            FileName::new("lib/../../etc/passwd"),
            Err(FileNameError::InvalidSegment(_))
        ));
        assert!(matches!(
            FileName::new("lib//a.jar"),
            Err(FileNameError::InvalidSegment(_))
        ));
    }

    #[test]
    fn relative_paths_convert() {
        let path: PathBuf = ["lib", "x86_64", "libfoo.so"].iter().collect();
        let name = FileName::from_relative_path(&path).unwrap();
        assert_eq!(name.as_str(), "lib/x86_64/libfoo.so");
        assert_eq!(name.to_path(), path);
    }
}
