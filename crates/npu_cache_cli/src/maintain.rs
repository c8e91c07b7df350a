//! Cache inspection and maintenance: `info`, `list`, `verify`, `trim`, `clear`.

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use npu_cache::{DiskCache, EntryInfo};
use npu_config::CacheConfig;
use serde::Serialize;

use crate::GlobalArgs;

/// Summary printed by `npu-cache info`.
#[derive(Debug, Serialize)]
struct CacheSummary {
    enabled: bool,
    dir: Option<PathBuf>,
    config: CacheConfig,
    size_bytes: u64,
    entries: usize,
}

/// One row of `npu-cache list`.
#[derive(Debug, Serialize)]
struct EntryRow {
    key: String,
    size: u64,
    accessed_unix: u64,
}

impl From<EntryInfo> for EntryRow {
    fn from(entry: EntryInfo) -> Self {
        let accessed_unix = entry
            .accessed
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        Self {
            key: entry.name,
            size: entry.size,
            accessed_unix,
        }
    }
}

fn summarize(config: CacheConfig) -> CacheSummary {
    let cache = DiskCache::new(&config);
    let entries = cache.entries();
    CacheSummary {
        enabled: cache.is_enabled(),
        dir: cache.state().dir().map(PathBuf::from),
        config,
        size_bytes: entries.iter().map(|e| e.size).sum(),
        entries: entries.len(),
    }
}

/// Runs `npu-cache info`. A disabled cache is reported, not an error.
pub fn info(json: bool, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let summary = summarize(global.config()?);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(0);
    }

    match &summary.dir {
        Some(dir) => {
            println!("cache directory: {}", dir.display());
            println!("size budget:     {} bytes", summary.config.max_size_bytes);
            println!("current size:    {} bytes", summary.size_bytes);
            println!("entries:         {}", summary.entries);
        }
        None => println!("cache is disabled"),
    }
    Ok(0)
}

/// Runs `npu-cache list`.
pub fn list(json: bool, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = global.open_cache()?;
    let rows: Vec<EntryRow> = cache.entries().into_iter().map(EntryRow::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(0);
    }

    for row in &rows {
        println!("{:>12}  {:>10}  {}", row.size, row.accessed_unix, row.key);
    }
    if !global.quiet {
        eprintln!("{} entries", rows.len());
    }
    Ok(0)
}

/// Runs `npu-cache verify`. Exits with 1 when corrupt entries were found.
pub fn verify(json: bool, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = global.open_cache()?;
    let report = cache.verify();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !global.quiet {
        for name in &report.corrupt {
            eprintln!("removed corrupt entry {name}");
        }
        eprintln!(
            "{} valid, {} corrupt, {} skipped",
            report.valid,
            report.corrupt.len(),
            report.skipped
        );
    }
    Ok(if report.corrupt.is_empty() { 0 } else { 1 })
}

/// Runs `npu-cache trim`.
pub fn trim(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = global.open_cache()?;
    let freed = cache.trim();
    if !global.quiet {
        eprintln!(
            "freed {freed} bytes, {} of {} bytes in use",
            cache.size(),
            cache.state().max_size()
        );
    }
    Ok(0)
}

/// Runs `npu-cache clear`.
pub fn clear(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let cache = global.open_cache()?;
    let freed = cache.clear();
    let remaining = cache.entries().len();
    if !global.quiet {
        eprintln!("freed {freed} bytes");
        if remaining > 0 {
            eprintln!("{remaining} entries in use were kept");
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use npu_cache::CacheKey;

    fn global_for(dir: &std::path::Path, max_size: u64) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            dir: Some(dir.to_path_buf()),
            max_size: Some(max_size),
        }
    }

    #[test]
    fn summary_counts_entries() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::new(dir.path(), 1 << 20);
        let cache = DiskCache::new(&config);
        cache.set(&CacheKey::parse("a").unwrap(), &[1u8; 10]);
        cache.set(&CacheKey::parse("b").unwrap(), &[2u8; 20]);

        let summary = summarize(config);
        assert!(summary.enabled);
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.size_bytes, 10 + 20 + 40);
        assert_eq!(summary.config.max_size_bytes, 1 << 20);
    }

    #[test]
    fn summary_json_embeds_config() {
        let dir = tempfile::tempdir().unwrap();
        let value = serde_json::to_value(summarize(CacheConfig::new(dir.path(), 100))).unwrap();
        assert_eq!(value["enabled"], true);
        assert_eq!(value["config"]["max_size_bytes"], 100);
        assert_eq!(value["config"]["cache_dir"], dir.path().to_str().unwrap());
        assert_eq!(value["entries"], 0);
    }

    #[test]
    fn summary_of_disabled_config() {
        let summary = summarize(CacheConfig::disabled());
        assert!(!summary.enabled);
        assert!(summary.dir.is_none());
        assert_eq!(summary.entries, 0);
    }

    #[test]
    fn verify_report_json_shape() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(&CacheConfig::new(dir.path(), 1 << 20));
        cache.set(&CacheKey::parse("good").unwrap(), b"data");
        std::fs::write(dir.path().join("bad"), vec![0u8; 40]).unwrap();

        let value = serde_json::to_value(cache.verify()).unwrap();
        assert_eq!(value["valid"], 1);
        assert_eq!(value["corrupt"][0], "bad");
        assert_eq!(value["skipped"], 0);
    }

    #[test]
    fn entry_row_uses_unix_seconds() {
        let row = EntryRow::from(EntryInfo {
            name: "k".to_string(),
            size: 42,
            accessed: UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000),
        });
        assert_eq!(row.key, "k");
        assert_eq!(row.accessed_unix, 1_700_000_000);
    }

    #[test]
    fn verify_reports_corruption_in_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let global = global_for(dir.path(), 1 << 20);
        assert_eq!(verify(false, &global).unwrap(), 0);

        std::fs::write(dir.path().join("broken"), vec![0u8; 40]).unwrap();
        assert_eq!(verify(true, &global).unwrap(), 1);
        assert!(!dir.path().join("broken").exists());
    }

    #[test]
    fn trim_and_clear_run() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(&CacheConfig::new(dir.path(), 1 << 20));
        cache.set(&CacheKey::parse("a").unwrap(), &[1u8; 80]);
        cache.set(&CacheKey::parse("b").unwrap(), &[2u8; 80]);

        assert_eq!(trim(&global_for(dir.path(), 150)).unwrap(), 0);
        assert_eq!(cache.entries().len(), 1);

        assert_eq!(clear(&global_for(dir.path(), 150)).unwrap(), 0);
        assert!(cache.entries().is_empty());
    }
}
