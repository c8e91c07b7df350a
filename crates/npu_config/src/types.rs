//! Strongly-typed cache configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::env::EnvSource;
use crate::error::ConfigError;
use crate::resolve::{resolve_cache_dir, resolve_max_size};

/// Explicit cache directory override. An empty value disables the cache.
pub const CACHE_DIR_VAR: &str = "ZE_INTEL_NPU_CACHE_DIR";

/// Cache size budget override, in bytes.
pub const CACHE_SIZE_VAR: &str = "ZE_INTEL_NPU_CACHE_SIZE";

/// XDG base directory for user caches.
pub const XDG_CACHE_HOME_VAR: &str = "XDG_CACHE_HOME";

/// User home directory.
pub const HOME_VAR: &str = "HOME";

/// Directory name appended to `XDG_CACHE_HOME`.
pub const CACHE_DIR_NAME: &str = "ze_intel_npu_cache";

/// Hidden path appended to `HOME` or the working directory.
pub const HIDDEN_CACHE_PATH: &str = ".cache/ze_intel_npu_cache";

/// Default cache size budget: 4 GiB.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Cache configuration resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding cache entries. `None` disables the cache.
    pub cache_dir: Option<PathBuf>,

    /// Total on-disk budget for cache entries, including checksums.
    #[serde(default = "default_max_size")]
    pub max_size_bytes: u64,
}

fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE_BYTES
}

impl CacheConfig {
    /// Creates a configuration for an explicit directory and budget.
    pub fn new(cache_dir: impl Into<PathBuf>, max_size_bytes: u64) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            max_size_bytes,
        }
    }

    /// Creates a configuration with the cache turned off.
    pub fn disabled() -> Self {
        Self {
            cache_dir: None,
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
        }
    }

    /// Resolves the configuration from environment variables.
    ///
    /// The directory is taken, in priority order, from `ZE_INTEL_NPU_CACHE_DIR`,
    /// `XDG_CACHE_HOME`, `HOME`, and finally the working directory. The budget
    /// comes from `ZE_INTEL_NPU_CACHE_SIZE` and falls back to 4 GiB.
    pub fn from_env(env: &impl EnvSource) -> Result<Self, ConfigError> {
        Ok(Self {
            cache_dir: resolve_cache_dir(env)?,
            max_size_bytes: resolve_max_size(env),
        })
    }

    /// Returns the cache directory if the cache is enabled.
    pub fn dir(&self) -> Option<&Path> {
        self.cache_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Returns `true` if a non-empty cache directory is configured.
    pub fn is_enabled(&self) -> bool {
        self.dir().is_some()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::disabled()
    }
}
