//! Compiled blob buffers.
//!
//! A [`Blob`] is either an owned buffer (fresh compiler output or a native
//! input) or a view into a memory-mapped cache entry. Callers only ever see
//! the bytes; which backing is in use does not matter to them.

use std::fmt;
use std::ops::Deref;

use crate::fs::StoreFile;

/// An immutable compiled binary.
pub enum Blob {
    /// Bytes held in memory.
    Owned(Vec<u8>),
    /// A prefix of a memory-mapped cache entry.
    Mapped(MappedBlob),
}

/// A mapped cache entry whose trailing checksum is hidden from view.
///
/// Owns the open, shared-locked file handle so the mapping stays valid for
/// as long as the blob lives.
pub struct MappedBlob {
    file: Box<dyn StoreFile>,
    len: usize,
}

impl MappedBlob {
    /// Wraps an already mapped file, exposing its first `len` bytes.
    pub(crate) fn new(file: Box<dyn StoreFile>, len: usize) -> Self {
        Self { file, len }
    }

    fn as_slice(&self) -> &[u8] {
        self.file
            .mapped()
            .and_then(|map| map.get(..self.len))
            .unwrap_or_default()
    }
}

impl Blob {
    /// Returns the blob bytes.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Blob::Owned(bytes) => bytes,
            Blob::Mapped(mapped) => mapped.as_slice(),
        }
    }

    /// Returns `true` if the blob is backed by a cache entry mapping.
    pub fn is_mapped(&self) -> bool {
        matches!(self, Blob::Mapped(_))
    }

    /// Copies the blob into an owned buffer, releasing any file handle.
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Blob::Owned(bytes) => bytes,
            Blob::Mapped(mapped) => mapped.as_slice().to_vec(),
        }
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Blob::Owned(bytes)
    }
}

impl From<&[u8]> for Blob {
    fn from(bytes: &[u8]) -> Self {
        Blob::Owned(bytes.to_vec())
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = if self.is_mapped() { "mapped" } else { "owned" };
        write!(f, "Blob({backing}, {} bytes)", self.len())
    }
}
