//! Shared foundational types used across the NPU blob cache.
//!
//! This crate provides the incremental digest abstraction used both for
//! deriving cache keys and for validating the integrity of cached entries.

#![warn(missing_docs)]

pub mod digest;

pub use digest::{Digest, DigestBytes, Sha1};
