//! Error types for cache and graph loading operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Cache operations are fail-safe: these errors never cross the public
/// `get`/`set` boundary, where they are logged and turned into misses or
/// skipped writes. The enum exists for propagation within the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while touching a cache file or directory.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The advisory lock is held by someone else.
    #[error("cache entry {path} is locked: {source}")]
    Locked {
        /// The locked file.
        path: PathBuf,
        /// The error reported by the lock call.
        source: std::io::Error,
    },

    /// The path does not refer to a usable cache entry file.
    #[error("invalid cache file {path}: {reason}")]
    InvalidFile {
        /// The offending file.
        path: PathBuf,
        /// Why the file was rejected.
        reason: String,
    },

    /// The entry is too short to hold its trailing checksum.
    #[error("cache entry {path} is truncated: {size} bytes")]
    Truncated {
        /// The entry file.
        path: PathBuf,
        /// The actual file size.
        size: u64,
    },

    /// The trailing checksum does not match the entry content.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The entry file.
        path: PathBuf,
        /// The checksum stored in the file.
        expected: String,
        /// The checksum computed from the content.
        actual: String,
    },
}

/// Errors that can occur while turning a graph description into a blob.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph description carries no input bytes.
    #[error("graph input is empty")]
    EmptyInput,

    /// The format discriminator is not one the driver understands.
    #[error("unsupported graph format {0:#x}")]
    UnsupportedFormat(u32),

    /// The compiler failed to produce a blob.
    #[error("graph compilation failed: {0}")]
    Compile(#[source] Box<dyn std::error::Error + Send + Sync>),
}
