//! File store abstraction the cache is built on.
//!
//! The cache never touches the filesystem directly. It goes through a
//! [`FileStore`], whose only production implementation is
//! [`PosixFileStore`](crate::posix::PosixFileStore). Lock acquisition is
//! non-blocking: contention surfaces as [`CacheError::Locked`] and callers
//! treat it as an ordinary branch.

use std::path::Path;
use std::time::SystemTime;

use crate::error::CacheError;

/// Metadata reported for each regular file during a directory scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStat {
    /// File size in bytes.
    pub size: u64,
    /// Last access time as recorded by the filesystem.
    pub accessed: SystemTime,
}

/// An open, advisory-locked cache file.
///
/// The lock is held for as long as the handle lives and is released when it
/// is dropped, on every exit path.
pub trait StoreFile: Send + Sync + 'static {
    /// Current size of the file in bytes, including anything written through
    /// this handle.
    fn size(&self) -> u64;

    /// Maps the whole file read-only and returns the mapped bytes.
    ///
    /// Mapping is idempotent; a second call returns the existing mapping.
    /// Handles opened for writing cannot be mapped.
    fn map(&mut self) -> Result<&[u8], CacheError>;

    /// Returns the mapping established by [`StoreFile::map`], if any.
    fn mapped(&self) -> Option<&[u8]>;

    /// Appends `data` to the file. Empty writes are rejected.
    fn write(&mut self, data: &[u8]) -> Result<(), CacheError>;
}

/// Filesystem operations consumed by the cache.
pub trait FileStore {
    /// The locked file handle type produced by this store.
    type File: StoreFile;

    /// Creates `path` and all missing parents.
    fn create_directories(&self, path: &Path) -> Result<(), CacheError>;

    /// Opens an existing file read-only under a shared lock.
    fn open_shared(&self, path: &Path) -> Result<Self::File, CacheError>;

    /// Opens a file under an exclusive lock.
    ///
    /// With `create` set, the file must not exist yet and is created for
    /// writing; otherwise an existing file is opened read-only.
    fn open_exclusive(&self, path: &Path, create: bool) -> Result<Self::File, CacheError>;

    /// Removes a file without taking any lock.
    fn remove_file(&self, path: &Path) -> Result<(), CacheError>;

    /// Calls `visitor` with the name and metadata of every regular file
    /// directly inside `dir`. Entries that cannot be inspected are skipped.
    fn scan_dir(
        &self,
        dir: &Path,
        visitor: &mut dyn FnMut(&str, &EntryStat),
    ) -> Result<(), CacheError>;
}
