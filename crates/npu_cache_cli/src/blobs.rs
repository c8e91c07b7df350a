//! Moving blobs in and out of the cache: `key`, `get`, `put`.

use std::io::Write;

use npu_cache::key::DRIVER_VERSION;
use npu_cache::{
    derive_key, CacheKey, CompilerProperties, GraphDesc, GraphFlags, GraphFormat, SetOutcome,
};
use npu_common::Sha1;
use serde::Serialize;

use crate::{GetArgs, GlobalArgs, KeyArgs, PutArgs};

/// What `npu-cache key --json` prints: the key and every input behind it.
#[derive(Debug, Serialize)]
struct KeyReport<'a> {
    key: CacheKey,
    driver_version: u32,
    format: GraphFormat,
    flags: GraphFlags,
    build_flags: Option<&'a str>,
    compiler: Option<CompilerProperties>,
}

fn parse_key(text: &str) -> Result<CacheKey, Box<dyn std::error::Error>> {
    CacheKey::parse(text).ok_or_else(|| format!("invalid cache key '{text}'").into())
}

fn graph_flags(args: &KeyArgs) -> GraphFlags {
    let mut flags = GraphFlags::NONE;
    if args.disable_caching {
        flags = flags | GraphFlags::DISABLE_CACHING;
    }
    if args.profiling {
        flags = flags | GraphFlags::ENABLE_PROFILING;
    }
    flags
}

fn compiler_properties(args: &KeyArgs) -> Option<CompilerProperties> {
    args.compiler_id.as_ref().map(|id| CompilerProperties {
        id: id.clone(),
        version: args.compiler_version,
        supported_opsets: args.opsets,
    })
}

/// Derives the key for `input` as the driver would.
fn key_report<'a>(args: &'a KeyArgs, input: &[u8]) -> KeyReport<'a> {
    let flags = graph_flags(args);
    let build_flags = args.build_flags.as_deref();
    let compiler = compiler_properties(args);

    let mut desc = GraphDesc::new(args.format, input).with_flags(flags);
    if let Some(build_flags) = build_flags {
        desc = desc.with_build_flags(build_flags);
    }
    KeyReport {
        key: derive_key::<Sha1>(DRIVER_VERSION, compiler.as_ref(), &desc),
        driver_version: DRIVER_VERSION,
        format: args.format,
        flags,
        build_flags,
        compiler,
    }
}

/// Runs `npu-cache key`. Works whether or not the cache is enabled.
pub fn key(args: &KeyArgs, _global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let input = std::fs::read(&args.input)?;
    let report = key_report(args, &input);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.key);
    }
    Ok(0)
}

/// Runs `npu-cache get`. Exits with 1 on a miss.
pub fn get(args: &GetArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = global.open_cache()?;
    let key = parse_key(&args.key)?;

    let Some(blob) = cache.get(&key) else {
        if !global.quiet {
            eprintln!("miss: {key}");
        }
        return Ok(1);
    };

    match &args.output {
        Some(path) => std::fs::write(path, &*blob)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&blob)?;
            stdout.flush()?;
        }
    }
    Ok(0)
}

/// Runs `npu-cache put`. Exits with 1 unless the blob was stored.
pub fn put(args: &PutArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = global.open_cache()?;
    let key = parse_key(&args.key)?;
    let blob = std::fs::read(&args.blob)?;

    let outcome = cache.set(&key, &blob);
    if args.json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else if !global.quiet {
        match outcome {
            SetOutcome::Stored { bytes } => eprintln!("stored {key} ({bytes} bytes on disk)"),
            SetOutcome::Skipped(reason) => eprintln!("not stored: {reason:?}"),
            SetOutcome::Failed => eprintln!("failed to store {key}"),
        }
    }
    Ok(match outcome {
        SetOutcome::Stored { .. } => 0,
        _ => 1,
    })
}
