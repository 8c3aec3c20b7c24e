//! Errors raised by the container reader and writer.

use std::io;
use std::path::PathBuf;

use carton_schema::{DeclarationError, FileName, FileNameError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive error in {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{} has no package declaration", path.display())]
    MissingManifest { path: PathBuf },

    #[error("cannot parse package declaration in {}: {source}", path.display())]
    Unparseable {
        path: PathBuf,
        #[source]
        source: DeclarationError,
    },

    #[error("cannot serialize package declaration: {0}")]
    Declaration(#[source] DeclarationError),

    #[error("declared entry '{name}' is missing from the archive")]
    MissingEntry { name: FileName },

    #[error("'{name}' is not a declared entry")]
    NoSuchEntry { name: FileName },

    #[error("hash mismatch for '{name}': expected {algorithm}:{expected}, got {actual}")]
    HashMismatch {
        name: FileName,
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported hash algorithm '{algorithm}' for '{name}'")]
    HashAlgorithmUnsupported { name: FileName, algorithm: String },

    #[error("'{name}' is reserved for the package declaration")]
    Reserved { name: FileName },

    #[error("'{name}' is not declared in the manifest")]
    NotDeclared { name: FileName },

    #[error("'{name}' was already written")]
    AlreadyWritten { name: FileName },

    #[error("declared entries were never written: {}", join_names(names))]
    FileMissed { names: Vec<FileName> },

    #[error("cannot move {} to {}: {source}", from.display(), to.display())]
    Commit {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{name}' and '{existing}' both unpack to {}", target.display())]
    LayoutConflict {
        name: FileName,
        existing: FileName,
        target: PathBuf,
    },

    #[error("{} cannot be stored as an entry: {source}", path.display())]
    InvalidName {
        path: PathBuf,
        #[source]
        source: FileNameError,
    },

    #[error("container is closed")]
    Closed,
}

fn join_names(names: &[FileName]) -> String {
    names
        .iter()
        .map(FileName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ContainerError {
    /// Stable short tag for display and log aggregation.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Archive { .. } => "archive",
            Self::MissingManifest { .. } => "missing-manifest",
            Self::Unparseable { .. } => "unparseable",
            Self::Declaration(_) => "declaration",
            Self::MissingEntry { .. } => "missing-entry",
            Self::NoSuchEntry { .. } => "no-such-entry",
            Self::HashMismatch { .. } => "hash-mismatch",
            Self::HashAlgorithmUnsupported { .. } => "hash-algorithm-unsupported",
            Self::Reserved { .. } => "reserved",
            Self::NotDeclared { .. } => "not-declared",
            Self::AlreadyWritten { .. } => "already-written",
            Self::FileMissed { .. } => "file-missed",
            Self::Commit { .. } => "commit",
            Self::LayoutConflict { .. } => "layout-conflict",
            Self::InvalidName { .. } => "invalid-name",
            Self::Closed => "closed",
        }
    }

    /// Named values describing the failure.
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Io { path, .. }
            | Self::Archive { path, .. }
            | Self::MissingManifest { path }
            | Self::Unparseable { path, .. }
            | Self::InvalidName { path, .. } => vec![("path", path.display().to_string())],
            Self::MissingEntry { name }
            | Self::NoSuchEntry { name }
            | Self::Reserved { name }
            | Self::NotDeclared { name }
            | Self::AlreadyWritten { name } => vec![("name", name.to_string())],
            Self::HashMismatch {
                name,
                algorithm,
                expected,
                actual,
            } => vec![
                ("name", name.to_string()),
                ("algorithm", algorithm.clone()),
                ("expected", expected.clone()),
                ("actual", actual.clone()),
            ],
            Self::HashAlgorithmUnsupported { name, algorithm } => {
                vec![("name", name.to_string()), ("algorithm", algorithm.clone())]
            }
            Self::FileMissed { names } => vec![("names", join_names(names))],
            Self::Commit { from, to, .. } => vec![
                ("from", from.display().to_string()),
                ("to", to.display().to_string()),
            ],
            Self::LayoutConflict {
                name,
                existing,
                target,
            } => vec![
                ("name", name.to_string()),
                ("existing", existing.to_string()),
                ("path", target.display().to_string()),
            ],
            Self::Declaration(_) | Self::Closed => Vec::new(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>) -> impl FnOnce(zip::result::ZipError) -> Self {
        let path = path.into();
        move |source| Self::Archive { path, source }
    }
}
