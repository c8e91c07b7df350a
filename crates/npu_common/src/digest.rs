//! Incremental digests for cache key derivation and entry checksums.

use serde::{Serialize, Serializer};
use std::fmt;

/// A fixed-length cryptographic digest consumed incrementally.
///
/// Implementations are stateful hashers: feed bytes with [`Digest::update`]
/// and consume the hasher with [`Digest::finalize`]. The finalized output is
/// always exactly [`Digest::LEN`] bytes long.
pub trait Digest: Default {
    /// Length of the finalized digest in bytes.
    const LEN: usize;

    /// Feeds more bytes into the digest.
    fn update(&mut self, data: &[u8]);

    /// Consumes the hasher and returns the digest.
    fn finalize(self) -> DigestBytes;

    /// Computes the digest of a single byte slice.
    fn digest_of(data: &[u8]) -> DigestBytes {
        let mut hasher = Self::default();
        hasher.update(data);
        hasher.finalize()
    }
}

/// The raw output of a [`Digest`].
///
/// Displays as lower-case hex, which is the canonical printable encoding
/// used for cache keys.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DigestBytes(Vec<u8>);

impl DigestBytes {
    /// Wraps raw digest bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the lower-case hex encoding of the digest.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Returns the digest length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the digest holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for DigestBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq<[u8]> for DigestBytes {
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == other
    }
}

impl fmt::Display for DigestBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DigestBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [a, b, ..] => write!(f, "DigestBytes({a:02x}{b:02x}..)"),
            _ => write!(f, "DigestBytes({})", self.to_hex()),
        }
    }
}

impl Serialize for DigestBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// SHA-1 (160-bit) digest.
///
/// Cache entries carry a trailing SHA-1 of their content, and cache keys are
/// the hex encoding of a SHA-1 over the compilation inputs.
#[derive(Default, Clone)]
pub struct Sha1(sha1::Sha1);

impl Digest for Sha1 {
    const LEN: usize = 20;

    fn update(&mut self, data: &[u8]) {
        sha1::Digest::update(&mut self.0, data);
    }

    fn finalize(self) -> DigestBytes {
        DigestBytes(sha1::Digest::finalize(self.0).to_vec())
    }
}
