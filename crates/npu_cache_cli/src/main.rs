//! `npu-cache`: operator tool for the NPU compiled-blob cache.
//!
//! Inspects the cache the driver would use (`info`, `list`), checks and
//! shrinks it (`verify`, `trim`, `clear`), and moves blobs in and out of it
//! (`key`, `get`, `put`). Every subcommand resolves the cache location the
//! same way the driver does unless `--dir` overrides it.

#![warn(missing_docs)]

mod blobs;
mod maintain;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use npu_cache::{DiskCache, GraphFormat};
use npu_config::{CacheConfig, ProcessEnv, DEFAULT_MAX_SIZE_BYTES};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Inspect and maintain the NPU compiled-blob cache.
#[derive(Parser, Debug)]
#[command(name = "npu-cache", version, about = "NPU compiled-blob cache tool")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this cache directory instead of the one resolved from the
    /// environment.
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Override the cache size budget in bytes.
    #[arg(long, global = true)]
    pub max_size: Option<u64>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the resolved cache configuration and usage.
    Info {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// List cache entries, least recently used first.
    List {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Check every entry's checksum and remove corrupt ones.
    Verify {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Evict least recently used entries until the cache fits its budget.
    Trim,
    /// Remove every entry not in use.
    Clear,
    /// Compute the cache key for a graph file.
    Key(KeyArgs),
    /// Copy a cached blob out of the cache.
    Get(GetArgs),
    /// Store a blob under a key.
    Put(PutArgs),
}

/// Arguments for `npu-cache key`.
#[derive(Parser, Debug)]
pub struct KeyArgs {
    /// Graph input file.
    pub input: PathBuf,

    /// Encoding of the input file: `native`, `intermediate`, or the
    /// driver's numeric discriminator (e.g. `0x2`).
    #[arg(short, long, value_parser = parse_format, default_value = "intermediate")]
    pub format: GraphFormat,

    /// Compiler build flags string.
    #[arg(long, allow_hyphen_values = true)]
    pub build_flags: Option<String>,

    /// Set the disable-caching creation flag.
    #[arg(long)]
    pub disable_caching: bool,

    /// Set the profiling creation flag.
    #[arg(long)]
    pub profiling: bool,

    /// Compiler identification string. Without it the key is derived as if
    /// no compiler were loaded.
    #[arg(long)]
    pub compiler_id: Option<String>,

    /// Compiler version.
    #[arg(long, default_value_t = 0)]
    pub compiler_version: u32,

    /// Compiler supported opset mask.
    #[arg(long, default_value_t = 0)]
    pub opsets: u64,

    /// Print the key and its inputs as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `npu-cache get`.
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Cache key.
    pub key: String,

    /// Write the blob here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `npu-cache put`.
#[derive(Parser, Debug)]
pub struct PutArgs {
    /// Cache key.
    pub key: String,

    /// File holding the blob to store.
    pub blob: PathBuf,

    /// Print the outcome as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parses a graph format given by name or by numeric discriminator.
fn parse_format(text: &str) -> Result<GraphFormat, String> {
    match text {
        "native" => return Ok(GraphFormat::Native),
        "intermediate" => return Ok(GraphFormat::Intermediate),
        _ => {}
    }

    let raw = match text.strip_prefix("0x") {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => text.parse(),
    }
    .map_err(|_| format!("unknown graph format '{text}'"))?;
    GraphFormat::from_raw(raw).map_err(|err| err.to_string())
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Explicit cache directory.
    pub dir: Option<PathBuf>,
    /// Explicit size budget.
    pub max_size: Option<u64>,
}

impl GlobalArgs {
    /// Resolves the cache configuration, applying command-line overrides.
    pub fn config(&self) -> Result<CacheConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.dir {
            Some(dir) => CacheConfig::new(dir, DEFAULT_MAX_SIZE_BYTES),
            None => CacheConfig::from_env(&ProcessEnv)?,
        };
        if let Some(max_size) = self.max_size {
            config.max_size_bytes = max_size;
        }
        Ok(config)
    }

    /// Opens the cache, failing if it ends up disabled.
    pub fn open_cache(&self) -> Result<DiskCache, Box<dyn std::error::Error>> {
        let cache = DiskCache::new(&self.config()?);
        if !cache.is_enabled() {
            return Err("cache is disabled".into());
        }
        Ok(cache)
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let log_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let global = GlobalArgs {
        quiet: cli.quiet,
        dir: cli.dir,
        max_size: cli.max_size,
    };

    let result = match cli.command {
        Command::Info { json } => maintain::info(json, &global),
        Command::List { json } => maintain::list(json, &global),
        Command::Verify { json } => maintain::verify(json, &global),
        Command::Trim => maintain::trim(&global),
        Command::Clear => maintain::clear(&global),
        Command::Key(ref args) => blobs::key(args, &global),
        Command::Get(ref args) => blobs::get(args, &global),
        Command::Put(ref args) => blobs::put(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
