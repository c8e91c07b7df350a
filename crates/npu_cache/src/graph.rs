//! Graph loading: the caller-side get-or-compile-and-set flow.

use std::error::Error;

use npu_common::Digest;
use tracing::debug;

use crate::blob::Blob;
use crate::error::GraphError;
use crate::fs::FileStore;
use crate::key::{CompilerProperties, GraphDesc, GraphFlags, GraphFormat};
use crate::store::{DiskCache, SetOutcome};

/// A compiler that turns intermediate-format graphs into device blobs.
pub trait Compiler {
    /// Identity of the compiler, mixed into cache keys.
    ///
    /// `None` when no compiler is loaded; keys are then derived without it.
    fn properties(&self) -> Option<CompilerProperties>;

    /// Compiles `desc` into a blob.
    fn compile(&self, desc: &GraphDesc<'_>) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>>;
}

/// What the cache did while loading a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// The cache was not consulted (native input or caching disabled).
    Bypassed,
    /// The blob came from the cache.
    Hit,
    /// The blob was compiled and stored.
    Stored,
    /// The blob was compiled but not stored.
    NotStored,
}

/// A loaded graph blob together with how it was obtained.
#[derive(Debug)]
pub struct LoadedGraph {
    /// The device blob.
    pub blob: Blob,
    /// What the cache did.
    pub status: CacheStatus,
}

/// Produces the device blob for `desc`, consulting `cache` for intermediate
/// inputs.
///
/// Native inputs are returned as-is. Intermediate inputs are looked up by key
/// and compiled on a miss; the compiled blob is then offered to the cache.
/// Cache problems never fail the load, only compiler errors do.
pub fn load_graph_blob<S, D, C>(
    cache: &DiskCache<S, D>,
    compiler: &C,
    desc: &GraphDesc<'_>,
) -> Result<LoadedGraph, GraphError>
where
    S: FileStore,
    D: Digest,
    C: Compiler + ?Sized,
{
    if desc.input.is_empty() {
        return Err(GraphError::EmptyInput);
    }

    if desc.format == GraphFormat::Native {
        return Ok(LoadedGraph {
            blob: Blob::from(desc.input),
            status: CacheStatus::Bypassed,
        });
    }

    if desc.flags.contains(GraphFlags::DISABLE_CACHING) {
        debug!("caching disabled by graph flags");
        let blob = compiler.compile(desc).map_err(GraphError::Compile)?;
        return Ok(LoadedGraph {
            blob: Blob::from(blob),
            status: CacheStatus::Bypassed,
        });
    }

    let properties = compiler.properties();
    let key = cache.compute_key(desc, properties.as_ref());
    if let Some(blob) = cache.get(&key) {
        return Ok(LoadedGraph {
            blob,
            status: CacheStatus::Hit,
        });
    }

    let compiled = compiler.compile(desc).map_err(GraphError::Compile)?;
    let status = match cache.set(&key, &compiled) {
        SetOutcome::Stored { .. } => CacheStatus::Stored,
        outcome => {
            debug!(?outcome, "compiled blob not cached");
            CacheStatus::NotStored
        }
    };

    Ok(LoadedGraph {
        blob: Blob::from(compiled),
        status,
    })
}
