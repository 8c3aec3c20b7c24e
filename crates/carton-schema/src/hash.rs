//! Content hashes and the digest algorithms behind them.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use sha2::Digest;

/// Digest algorithms the runtime can compute.
///
/// Declarations name algorithms by string (`SHA-256`, `BLAKE3`, ...). A name
/// that does not resolve to one of these variants is kept verbatim in the
/// [`Hash`] and only becomes an error when a digest has to be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-256 (FIPS 180-4).
    Sha256,
    /// SHA-384 (FIPS 180-4).
    Sha384,
    /// SHA-512 (FIPS 180-4).
    Sha512,
    /// BLAKE3 with the default 32-byte output.
    Blake3,
}

impl HashAlgorithm {
    /// Resolve an algorithm name. Case and `-`/`_` separators are ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            "blake3" => Some(Self::Blake3),
            _ => None,
        }
    }

    /// Canonical name written into declarations.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
            Self::Blake3 => "BLAKE3",
        }
    }

    /// Start an incremental digest.
    pub fn hasher(&self) -> Hasher {
        let state = match self {
            Self::Sha256 => HasherState::Sha256(sha2::Sha256::new()),
            Self::Sha384 => HasherState::Sha384(sha2::Sha384::new()),
            Self::Sha512 => HasherState::Sha512(sha2::Sha512::new()),
            Self::Blake3 => HasherState::Blake3(Box::new(blake3::Hasher::new())),
        };
        Hasher {
            algorithm: *self,
            state,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

enum HasherState {
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental digest computation.
///
/// Implements [`io::Write`] so content can be hashed with `io::copy` or teed
/// next to another writer while it streams.
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

impl Hasher {
    /// Feed bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(h) => h.update(data),
            HasherState::Sha384(h) => h.update(data),
            HasherState::Sha512(h) => h.update(data),
            HasherState::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finish and return the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        match self.state {
            HasherState::Sha256(h) => hex::encode(h.finalize()),
            HasherState::Sha384(h) => hex::encode(h.finalize()),
            HasherState::Sha512(h) => hex::encode(h.finalize()),
            HasherState::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }

    /// Finish and return a [`Hash`] tagged with this hasher's algorithm.
    pub fn finalize(self) -> Hash {
        let algorithm = self.algorithm;
        Hash::new(algorithm.name(), self.finalize_hex())
    }
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hasher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An (algorithm name, hex digest) pair.
///
/// Serialized as `<hash algorithm="SHA-256">…</hash>` in declarations. Digest
/// comparison is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hash {
    #[serde(rename = "@algorithm")]
    algorithm: String,
    #[serde(rename = "$text")]
    digest: String,
}

impl Hash {
    /// Create a hash from an algorithm name and hex digest (unvalidated).
    pub fn new(algorithm: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            digest: digest.into(),
        }
    }

    /// Shorthand for a SHA-256 hash.
    pub fn sha256(digest: impl Into<String>) -> Self {
        Self::new(HashAlgorithm::Sha256.name(), digest)
    }

    /// Hash everything `reader` yields with `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while reading.
    pub fn compute<R: Read>(algorithm: HashAlgorithm, mut reader: R) -> io::Result<Self> {
        let mut hasher = algorithm.hasher();
        io::copy(&mut reader, &mut hasher)?;
        Ok(hasher.finalize())
    }

    /// The declared algorithm name.
    pub fn algorithm_name(&self) -> &str {
        &self.algorithm
    }

    /// Resolve the declared algorithm, if supported.
    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        HashAlgorithm::from_name(&self.algorithm)
    }

    /// The hex digest as declared.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Case-insensitive digest comparison.
    pub fn matches_digest(&self, digest: &str) -> bool {
        self.digest.eq_ignore_ascii_case(digest)
    }
}

impl PartialEq for Hash {
    fn eq(&self, other: &Self) -> bool {
        let same_algorithm = match (self.algorithm(), other.algorithm()) {
            (Some(a), Some(b)) => a == b,
            _ => self.algorithm.eq_ignore_ascii_case(&other.algorithm),
        };
        same_algorithm && self.matches_digest(&other.digest)
    }
}

impl Eq for Hash {}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_of_empty_input() {
        let hash = Hash::compute(HashAlgorithm::Sha256, &b""[..]).unwrap();
        assert_eq!(hash.digest(), EMPTY_SHA256);
        assert_eq!(hash.algorithm_name(), "SHA-256");
    }

    #[test]
    fn algorithm_lookup_is_lenient() {
        assert_eq!(HashAlgorithm::from_name("sha256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::from_name("SHA-512"), Some(HashAlgorithm::Sha512));
        assert_eq!(HashAlgorithm::from_name("Blake3"), Some(HashAlgorithm::Blake3));
        assert_eq!(HashAlgorithm::from_name("MD5"), None);
    }

    #[test]
    fn digests_compare_case_insensitively() {
        let lower = Hash::sha256(EMPTY_SHA256);
        let upper = Hash::new("sha-256", EMPTY_SHA256.to_uppercase());
        assert_eq!(lower, upper);
        assert!(lower.matches_digest(&EMPTY_SHA256.to_uppercase()));
    }

    #[test]
    fn unknown_algorithm_is_preserved() {
        let hash = Hash::new("WHIRLPOOL", "00");
        assert_eq!(hash.algorithm(), None);
        assert_eq!(hash.algorithm_name(), "WHIRLPOOL");
    }

    #[test]
    fn blake3_matches_reference_crate() {
        let hash = Hash::compute(HashAlgorithm::Blake3, &b"hello world"[..]).unwrap();
        assert_eq!(hash.digest(), blake3::hash(b"hello world").to_hex().as_str());
    }
}
