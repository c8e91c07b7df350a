//! Resolution of the blob cache configuration from the process environment.
//!
//! The cache directory and size budget are read once at startup and produce a
//! strongly-typed [`CacheConfig`]. Environment access goes through
//! [`EnvSource`] so that resolution can be exercised without touching the
//! real process environment.

#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod resolve;
pub mod types;

pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use error::ConfigError;
pub use resolve::{resolve_cache_dir, resolve_max_size};
pub use types::*;
