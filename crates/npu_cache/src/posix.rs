//! POSIX file store: `flock` advisory locks and read-only `mmap`.
//!
//! Files are opened with `O_NOFOLLOW` and must be regular files with a
//! single hard link, so a cache entry can never be redirected elsewhere.
//! Locks are whole-file `flock` locks tied to the open file description and
//! are released when the handle is closed.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use memmap2::Mmap;

use crate::error::CacheError;
use crate::fs::{EntryStat, FileStore, StoreFile};

/// Permission bits for newly created entries: owner and group read.
const ENTRY_MODE: u32 = 0o440;

/// The production [`FileStore`] backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixFileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// An open cache file holding a `flock` lock.
pub struct PosixFile {
    file: File,
    path: PathBuf,
    writable: bool,
    size: u64,
    map: Option<Mmap>,
}

impl PosixFile {
    fn open(path: &Path, writable: bool) -> Result<Self, CacheError> {
        let mut options = OpenOptions::new();
        options.read(true);
        if writable {
            options.write(true).create_new(true).mode(ENTRY_MODE);
        }
        options.custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC);

        let file = options.open(path).map_err(|source| {
            tracing::trace!(path = %path.display(), %source, "failed to open cache file");
            CacheError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let meta = file.metadata().map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if !meta.is_file() || meta.nlink() > 1 {
            return Err(CacheError::InvalidFile {
                path: path.to_path_buf(),
                reason: "not a regular file with a single link".to_string(),
            });
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            writable,
            size: meta.len(),
            map: None,
        })
    }

    /// Takes the lock, then refreshes the size a writer may have changed
    /// since the file was opened.
    fn lock(&mut self, mode: LockMode) -> Result<(), CacheError> {
        let op = match mode {
            LockMode::Shared => libc::LOCK_SH,
            LockMode::Exclusive => libc::LOCK_EX,
        };
        // SAFETY: the descriptor is owned by `self.file` and stays open for
        // the duration of the call.
        let ret = unsafe { libc::flock(self.file.as_raw_fd(), op | libc::LOCK_NB) };
        if ret != 0 {
            let source = std::io::Error::last_os_error();
            tracing::trace!(path = %self.path.display(), ?mode, %source, "failed to acquire lock");
            return Err(CacheError::Locked {
                path: self.path.clone(),
                source,
            });
        }

        self.size = self
            .file
            .metadata()
            .map_err(|source| CacheError::Io {
                path: self.path.clone(),
                source,
            })?
            .len();
        Ok(())
    }

    /// Returns `true` if `path` still names the file behind this handle.
    fn is_linked_at(&self, path: &Path) -> bool {
        match (self.file.metadata(), std::fs::symlink_metadata(path)) {
            (Ok(ours), Ok(theirs)) => ours.dev() == theirs.dev() && ours.ino() == theirs.ino(),
            _ => false,
        }
    }

    /// The path this handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StoreFile for PosixFile {
    fn size(&self) -> u64 {
        self.size
    }

    fn map(&mut self) -> Result<&[u8], CacheError> {
        if self.writable {
            return Err(CacheError::InvalidFile {
                path: self.path.clone(),
                reason: "cannot map a file opened for writing".to_string(),
            });
        }

        if self.map.is_none() {
            // SAFETY: entries are never modified in place. Writers only create
            // new files, and the shared lock held by this handle excludes them.
            let map = unsafe { Mmap::map(&self.file) }.map_err(|source| CacheError::Io {
                path: self.path.clone(),
                source,
            })?;
            self.map = Some(map);
        }

        Ok(self.map.as_deref().unwrap_or_default())
    }

    fn mapped(&self) -> Option<&[u8]> {
        self.map.as_deref()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), CacheError> {
        if data.is_empty() {
            return Err(CacheError::InvalidFile {
                path: self.path.clone(),
                reason: "refusing an empty write".to_string(),
            });
        }

        self.file.write_all(data).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.size += data.len() as u64;
        Ok(())
    }
}

/// Locks a file this process has just created.
///
/// Between creation and locking another handle may lock the empty file, or
/// lock it, unlink it and let go. In the first case our empty file is
/// removed so the key is not blocked forever. In the second the lock
/// succeeds on an orphaned inode and anything written would be lost, so the
/// claim is abandoned.
fn claim_created(mut file: PosixFile, path: &Path) -> Result<PosixFile, CacheError> {
    if let Err(err) = file.lock(LockMode::Exclusive) {
        if file.is_linked_at(path) {
            let _ = std::fs::remove_file(path);
        }
        return Err(err);
    }

    if !file.is_linked_at(path) {
        tracing::trace!(path = %path.display(), "created file was unlinked before it was locked");
        return Err(CacheError::Locked {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "entry was removed before it could be locked",
            ),
        });
    }
    Ok(file)
}

impl FileStore for PosixFileStore {
    type File = PosixFile;

    fn create_directories(&self, path: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn open_shared(&self, path: &Path) -> Result<PosixFile, CacheError> {
        let mut file = PosixFile::open(path, false)?;
        file.lock(LockMode::Shared)?;
        Ok(file)
    }

    fn open_exclusive(&self, path: &Path, create: bool) -> Result<PosixFile, CacheError> {
        let mut file = PosixFile::open(path, create)?;
        if create {
            return claim_created(file, path);
        }
        file.lock(LockMode::Exclusive)?;
        Ok(file)
    }

    fn remove_file(&self, path: &Path) -> Result<(), CacheError> {
        std::fs::remove_file(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn scan_dir(
        &self,
        dir: &Path,
        visitor: &mut dyn FnMut(&str, &EntryStat),
    ) -> Result<(), CacheError> {
        let entries = std::fs::read_dir(dir).map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        for entry in entries.flatten() {
            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                _ => continue,
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            let stat = EntryStat {
                size: meta.len(),
                accessed: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
            };
            visitor(name, &stat);
        }

        Ok(())
    }
}
