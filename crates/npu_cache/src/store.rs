//! The disk cache itself.
//!
//! [`DiskCache`] ties the file store, the digest and the resolved
//! configuration into `get`/`set` operations. The cache directory is the only
//! source of truth: sizes and eviction order are recomputed from a directory
//! scan on every call, and no listing is kept in memory between calls.
//!
//! Entries are laid out as `[content][digest of content]` with no header.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use npu_common::{Digest, DigestBytes, Sha1};
use npu_config::{CacheConfig, EnvSource, ProcessEnv};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blob::{Blob, MappedBlob};
use crate::error::CacheError;
use crate::fs::{FileStore, StoreFile};
use crate::key::{derive_key, CacheKey, CompilerProperties, GraphDesc, DRIVER_VERSION};
use crate::posix::PosixFileStore;

/// Whether the cache is usable, decided once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    /// No usable directory. Every operation is a no-op.
    Disabled,
    /// Entries live in `dir` and are kept within `max_size` bytes.
    Enabled {
        /// The cache directory.
        dir: PathBuf,
        /// Budget for the sum of on-disk entry sizes.
        max_size: u64,
    },
}

impl CacheState {
    /// Resolves the state for `config`, creating the cache directory.
    ///
    /// A missing directory or one that cannot be created disables the cache
    /// for good. This is logged once here and never retried.
    pub fn initialize(config: &CacheConfig, store: &impl FileStore) -> Self {
        let Some(dir) = config.dir() else {
            warn!("cache path is empty, disabling cache");
            return CacheState::Disabled;
        };

        if let Err(err) = store.create_directories(dir) {
            warn!(%err, "failed to create cache directory, disabling cache");
            return CacheState::Disabled;
        }

        info!(
            path = %dir.display(),
            max_size = config.max_size_bytes,
            "cache is initialized"
        );
        CacheState::Enabled {
            dir: dir.to_path_buf(),
            max_size: config.max_size_bytes,
        }
    }

    /// Returns the cache directory, or `None` when disabled.
    pub fn dir(&self) -> Option<&Path> {
        match self {
            CacheState::Enabled { dir, .. } => Some(dir),
            CacheState::Disabled => None,
        }
    }

    /// Returns the size budget, or zero when disabled.
    pub fn max_size(&self) -> u64 {
        match self {
            CacheState::Enabled { max_size, .. } => *max_size,
            CacheState::Disabled => 0,
        }
    }

    /// Returns `true` if the cache is enabled.
    pub fn is_enabled(&self) -> bool {
        matches!(self, CacheState::Enabled { .. })
    }
}

/// Why a `set` did not store anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The cache is disabled.
    Disabled,
    /// The key is empty.
    EmptyKey,
    /// The blob is empty.
    EmptyBlob,
    /// The blob alone exceeds the whole budget.
    TooLarge,
    /// An entry with this key already exists.
    AlreadyCached,
    /// Another process holds the entry's lock.
    Locked,
}

/// Result of [`DiskCache::set`].
///
/// Purely informational: a compilation never fails because of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOutcome {
    /// The entry was written; `bytes` is its on-disk size.
    Stored {
        /// Content plus checksum length.
        bytes: u64,
    },
    /// Nothing was written.
    Skipped(SkipReason),
    /// Writing failed and the partial file was removed.
    Failed,
}

/// A cache entry as seen by a directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// File name, which is the cache key.
    pub name: String,
    /// On-disk size, including the checksum.
    pub size: u64,
    /// Last access time.
    pub accessed: SystemTime,
}

/// Result of [`DiskCache::verify`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Entries whose checksum matched.
    pub valid: usize,
    /// Entries that failed validation and were removed.
    pub corrupt: Vec<String>,
    /// Entries that could not be checked (locked, empty, unreadable).
    pub skipped: usize,
}

/// Content-addressed disk cache for compiled blobs.
///
/// Safe to share between threads and between processes pointing at the same
/// directory. Coordination happens only through advisory file locks; callers
/// racing on the same key in one process get the same guarantees as separate
/// processes do.
pub struct DiskCache<S: FileStore = PosixFileStore, D: Digest = Sha1> {
    state: CacheState,
    store: S,
    driver_version: u32,
    _digest: PhantomData<fn() -> D>,
}

impl DiskCache {
    /// Creates the cache configured from the process environment.
    ///
    /// Any resolution failure disables the cache instead of failing.
    pub fn from_env() -> Self {
        Self::with_env(&ProcessEnv)
    }

    /// Creates the cache configured from `env`, disabling it if no location
    /// can be resolved.
    pub fn with_env(env: &impl EnvSource) -> Self {
        let config = CacheConfig::from_env(env).unwrap_or_else(|err| {
            warn!(%err, "cannot resolve cache directory, disabling cache");
            CacheConfig::disabled()
        });
        Self::new(&config)
    }

    /// Creates the cache for an explicit configuration on the local filesystem.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_store(config, PosixFileStore)
    }
}

impl<S: FileStore, D: Digest> DiskCache<S, D> {
    /// Creates the cache on top of a custom file store.
    pub fn with_store(config: &CacheConfig, store: S) -> Self {
        let state = CacheState::initialize(config, &store);
        Self {
            state,
            store,
            driver_version: DRIVER_VERSION,
            _digest: PhantomData,
        }
    }

    /// Overrides the driver version mixed into derived keys.
    pub fn with_driver_version(mut self, driver_version: u32) -> Self {
        self.driver_version = driver_version;
        self
    }

    /// Returns the resolved cache state.
    pub fn state(&self) -> &CacheState {
        &self.state
    }

    /// Returns `true` if the cache is enabled.
    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// Length of the checksum trailing every entry.
    pub fn digest_len(&self) -> usize {
        D::LEN
    }

    /// Derives the key for a compilation request.
    ///
    /// Returns the empty key while the cache is disabled; callers must treat
    /// it as "do not cache".
    pub fn compute_key(
        &self,
        desc: &GraphDesc<'_>,
        compiler: Option<&CompilerProperties>,
    ) -> CacheKey {
        if !self.state.is_enabled() {
            return CacheKey::empty();
        }
        derive_key::<D>(self.driver_version, compiler, desc)
    }

    /// Looks up a cached blob.
    ///
    /// Any problem is a miss. An entry whose checksum does not match is also
    /// removed, without taking the exclusive lock.
    pub fn get(&self, key: &CacheKey) -> Option<Blob> {
        let dir = self.state.dir()?;
        if key.is_empty() {
            return None;
        }

        let path = dir.join(key.as_str());
        match self.read_entry(&path) {
            Ok(blob) => {
                debug!(%key, size = blob.len(), "cache hit");
                Some(blob)
            }
            Err(err) if is_corrupt(&err) => {
                warn!(%key, %err, "cache miss: corrupt entry, removing it");
                let _ = self.store.remove_file(&path);
                None
            }
            Err(err) => {
                debug!(%key, %err, "cache miss");
                None
            }
        }
    }

    /// Stores a blob under `key`, evicting old entries to make room.
    ///
    /// Never fails the caller: the outcome is informational only.
    pub fn set(&self, key: &CacheKey, blob: &[u8]) -> SetOutcome {
        let Some(dir) = self.state.dir() else {
            return SetOutcome::Skipped(SkipReason::Disabled);
        };
        if key.is_empty() {
            return SetOutcome::Skipped(SkipReason::EmptyKey);
        }
        if blob.is_empty() {
            return SetOutcome::Skipped(SkipReason::EmptyBlob);
        }
        let max_size = self.state.max_size();
        if blob.len() as u64 > max_size {
            debug!(%key, size = blob.len(), max_size, "blob exceeds cache budget, not caching");
            return SetOutcome::Skipped(SkipReason::TooLarge);
        }

        let entry_size = blob.len() as u64 + D::LEN as u64;
        let mut cache_size = self.scan_size(dir);
        if cache_size + entry_size > max_size {
            let freed = self.evict_lru(dir, cache_size + entry_size - max_size);
            cache_size = cache_size.saturating_sub(freed);
        }

        let path = dir.join(key.as_str());
        let mut file = match self.store.open_exclusive(&path, true) {
            Ok(file) => file,
            Err(err) => {
                debug!(%key, %err, "cannot create cache entry, skipping");
                return match err {
                    CacheError::Io { ref source, .. }
                        if source.kind() == std::io::ErrorKind::AlreadyExists =>
                    {
                        SetOutcome::Skipped(SkipReason::AlreadyCached)
                    }
                    CacheError::Locked { .. } => SetOutcome::Skipped(SkipReason::Locked),
                    _ => SetOutcome::Failed,
                };
            }
        };

        if let Err(err) = write_entry::<D>(&mut file, blob) {
            warn!(%key, %err, "failed to write cache entry, removing it");
            let _ = self.store.remove_file(&path);
            return SetOutcome::Failed;
        }

        cache_size += entry_size;
        info!(%key, data_size = blob.len(), cache_size, "cache set");
        SetOutcome::Stored { bytes: entry_size }
    }

    /// Returns the total on-disk size of all entries.
    pub fn size(&self) -> u64 {
        self.state.dir().map_or(0, |dir| self.scan_size(dir))
    }

    /// Lists all entries, least recently accessed first.
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.state
            .dir()
            .map(|dir| self.scan_entries(dir))
            .unwrap_or_default()
    }

    /// Validates every entry's checksum, removing corrupt ones.
    pub fn verify(&self) -> VerifyReport {
        let mut report = VerifyReport::default();
        let Some(dir) = self.state.dir() else {
            return report;
        };

        for entry in self.scan_entries(dir) {
            let path = dir.join(&entry.name);
            match self.read_entry(&path) {
                Ok(_) => report.valid += 1,
                Err(err) if is_corrupt(&err) => {
                    warn!(name = %entry.name, %err, "removing corrupt cache entry");
                    let _ = self.store.remove_file(&path);
                    report.corrupt.push(entry.name);
                }
                Err(err) => {
                    debug!(name = %entry.name, %err, "cannot verify cache entry");
                    report.skipped += 1;
                }
            }
        }
        report
    }

    /// Evicts least recently accessed entries until the cache fits its
    /// budget. Returns the number of bytes freed.
    pub fn trim(&self) -> u64 {
        let Some(dir) = self.state.dir() else {
            return 0;
        };
        let size = self.scan_size(dir);
        let max_size = self.state.max_size();
        if size <= max_size {
            return 0;
        }
        self.evict_lru(dir, size - max_size)
    }

    /// Removes every entry that is not currently locked. Returns the number
    /// of bytes freed.
    pub fn clear(&self) -> u64 {
        self.state
            .dir()
            .map_or(0, |dir| self.evict_lru(dir, u64::MAX))
    }

    fn read_entry(&self, path: &Path) -> Result<Blob, CacheError> {
        let mut file = self.store.open_shared(path)?;
        let size = file.size();
        if size == 0 {
            return Err(CacheError::InvalidFile {
                path: path.to_path_buf(),
                reason: "entry is empty".to_string(),
            });
        }
        if size < D::LEN as u64 {
            return Err(CacheError::Truncated {
                path: path.to_path_buf(),
                size,
            });
        }

        let data = file.map()?;
        let content_len = data.len() - D::LEN;
        let (content, stored) = data.split_at(content_len);
        let actual = D::digest_of(content);
        if actual != *stored {
            return Err(CacheError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: DigestBytes::new(stored.to_vec()).to_hex(),
                actual: actual.to_hex(),
            });
        }

        Ok(Blob::Mapped(MappedBlob::new(Box::new(file), content_len)))
    }

    fn scan_size(&self, dir: &Path) -> u64 {
        let mut size = 0u64;
        if let Err(err) = self.store.scan_dir(dir, &mut |_, stat| size += stat.size) {
            warn!(%err, "failed to scan cache directory");
        }
        size
    }

    fn scan_entries(&self, dir: &Path) -> Vec<EntryInfo> {
        let mut entries = Vec::new();
        let result = self.store.scan_dir(dir, &mut |name, stat| {
            entries.push(EntryInfo {
                name: name.to_string(),
                size: stat.size,
                accessed: stat.accessed,
            });
        });
        if let Err(err) = result {
            warn!(%err, "failed to scan cache directory");
        }

        entries.sort_by(|a, b| a.accessed.cmp(&b.accessed).then_with(|| a.name.cmp(&b.name)));
        entries
    }

    /// Removes entries in ascending access-time order until at least
    /// `needed` bytes are freed. Entries locked by anyone else are skipped.
    fn evict_lru(&self, dir: &Path, needed: u64) -> u64 {
        let mut freed = 0u64;
        for entry in self.scan_entries(dir) {
            let path = dir.join(&entry.name);
            let file = match self.store.open_exclusive(&path, false) {
                Ok(file) => file,
                Err(err) => {
                    debug!(name = %entry.name, %err, "skipping busy cache entry");
                    continue;
                }
            };

            let size = file.size();
            if let Err(err) = self.store.remove_file(&path) {
                debug!(name = %entry.name, %err, "failed to evict cache entry");
                continue;
            }

            debug!(
                name = %entry.name,
                last_access = unix_secs(entry.accessed),
                size,
                "evicted cache entry"
            );
            freed += size;
            if freed >= needed {
                break;
            }
        }
        freed
    }
}

fn write_entry<D: Digest>(file: &mut impl StoreFile, blob: &[u8]) -> Result<(), CacheError> {
    file.write(blob)?;
    file.write(D::digest_of(blob).as_bytes())
}

fn is_corrupt(err: &CacheError) -> bool {
    matches!(
        err,
        CacheError::ChecksumMismatch { .. } | CacheError::Truncated { .. }
    )
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}
