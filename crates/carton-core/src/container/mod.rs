//! The carton container: a zip archive carrying a package declaration and the
//! payload it lists.
//!
//! [`PackageWriter`] produces archives; [`PackageReader`] opens them, checks
//! entry hashes and unpacks them into the on-disk layout described in
//! [`layout`].

pub mod error;
pub mod layout;
pub mod reader;
pub mod writer;

use std::io::{self, Write};

use carton_schema::{FileName, Hash, HashAlgorithm, Hasher};

pub use error::ContainerError;
pub use layout::{AllPlatforms, Placement, PlatformPolicy, SinglePlatform};
pub use reader::{PackageReader, UnpackSummary};
pub use writer::PackageWriter;

/// Timestamp stored on every archive entry: 2020-01-01 00:00:00 (DOS time,
/// no timezone) as `(year, month, day, hour, minute, second)`.
pub const ARCHIVE_EPOCH: (u16, u8, u8, u8, u8, u8) = (2020, 1, 1, 0, 0, 0);

/// Modification time applied to unpacked files and directories, in seconds
/// since the Unix epoch (2000-01-01T00:00:00Z).
pub const UNPACK_EPOCH: i64 = 946_684_800;

pub(crate) fn resolve_algorithm(name: &FileName, hash: &Hash) -> Result<HashAlgorithm, ContainerError> {
    hash.algorithm()
        .ok_or_else(|| ContainerError::HashAlgorithmUnsupported {
            name: name.clone(),
            algorithm: hash.algorithm_name().to_string(),
        })
}

pub(crate) fn check_digest(name: &FileName, expected: &Hash, actual: String) -> Result<(), ContainerError> {
    if expected.matches_digest(&actual) {
        return Ok(());
    }
    Err(ContainerError::HashMismatch {
        name: name.clone(),
        algorithm: expected.algorithm_name().to_string(),
        expected: expected.digest().to_string(),
        actual,
    })
}

/// Writes through to `inner` while hashing every byte that was accepted.
pub(crate) struct HashingWriter<W> {
    inner: W,
    hasher: Hasher,
}

impl<W: Write> HashingWriter<W> {
    pub(crate) fn new(inner: W, hasher: Hasher) -> Self {
        Self { inner, hasher }
    }

    pub(crate) fn finish(mut self) -> io::Result<String> {
        self.inner.flush()?;
        Ok(self.hasher.finalize_hex())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_writer_tees_content() {
        let mut sink = Vec::new();
        let mut writer = HashingWriter::new(&mut sink, HashAlgorithm::Sha256.hasher());
        writer.write_all(b"hello world").unwrap();
        let digest = writer.finish().unwrap();

        assert_eq!(sink, b"hello world");
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn digest_check_reports_both_sides() {
        let name = FileName::new("lib/a.jar").unwrap();
        let err = check_digest(&name, &Hash::sha256("AA"), "bb".into()).unwrap_err();
        assert_eq!(err.kind(), "hash-mismatch");
        assert!(err.to_string().contains("SHA-256:AA"));
        assert!(check_digest(&name, &Hash::sha256("AA"), "aa".into()).is_ok());
    }
}
