//! Content-addressed disk cache for compiled NPU graph blobs.
//!
//! Compiled blobs are persisted under a key derived from every input that can
//! change the compiler's output. Entries are whole files with a trailing
//! checksum, coordinated across processes with advisory file locks and kept
//! within a size budget by least-recently-accessed eviction. Every failure
//! degrades to a cache miss; nothing here can fail a compilation.

#![warn(missing_docs)]

pub mod blob;
pub mod error;
pub mod fs;
pub mod graph;
pub mod key;
pub mod posix;
pub mod store;

pub use blob::Blob;
pub use error::{CacheError, GraphError};
pub use fs::{EntryStat, FileStore, StoreFile};
pub use graph::{load_graph_blob, CacheStatus, Compiler, LoadedGraph};
pub use key::{derive_key, CacheKey, CompilerProperties, GraphDesc, GraphFlags, GraphFormat};
pub use posix::{PosixFile, PosixFileStore};
pub use store::{CacheState, DiskCache, EntryInfo, SetOutcome, SkipReason, VerifyReport};
