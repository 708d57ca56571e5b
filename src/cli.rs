//! Command-line interface definitions.
//!
//! # Example
//!
//! ```bash
//! # Byte-identical files under two roots
//! dupengine scan ~/Downloads ~/Documents
//!
//! # Similar pictures, keeping the largest copy, as JSON
//! dupengine scan ~/Pictures --mode picture --threshold 0.03 --prefer largest --output json
//!
//! # Cache maintenance
//! dupengine cache info
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::duplicates::Criterion;
use crate::scanner::ScanMode;

/// Duplicate and near-duplicate file detection.
///
/// Fingerprints files (BLAKE3 for exact mode, block grids for pictures,
/// amplitude envelopes for WAV audio), caches fingerprints between runs
/// and reports groups of matching files with a suggested file to keep.
#[derive(Debug, Parser)]
#[command(name = "dupengine")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (default: platform config directory)
    #[arg(long, global = true, value_name = "PATH", env = "DUPENGINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan paths for duplicate files
    Scan(ScanArgs),
    /// Inspect or clear the fingerprint cache
    Cache(CacheArgs),
    /// Show or write the configuration file
    Config(ConfigArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Files or directories to scan
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Detection mode
    #[arg(short, long, value_enum)]
    pub mode: Option<ScanMode>,

    /// Largest accepted distance for picture/audio modes (0.0 to 1.0)
    #[arg(short, long, value_name = "F")]
    pub threshold: Option<f64>,

    /// Number of extraction workers
    #[arg(short = 'j', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Picture grid edge length (2 to 64)
    #[arg(long = "grid", value_name = "N")]
    pub grid_size: Option<u32>,

    /// Audio envelope segments (2 to 1024)
    #[arg(long = "segments", value_name = "N")]
    pub audio_segments: Option<u32>,

    /// Criterion for choosing the file to keep, most important first
    ///
    /// largest, smallest, newest, oldest, shortest-path, longest-path,
    /// folder=A,B  ext=png,jpg  name-contains=TEXT  name-lacks=TEXT
    #[arg(short, long = "prefer", value_name = "CRITERION")]
    pub prefer: Vec<Criterion>,

    /// Fingerprint cache database (default: platform cache directory)
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Do not use the fingerprint cache
    #[arg(long, conflicts_with = "cache")]
    pub no_cache: bool,

    /// Clear the fingerprint cache before scanning
    #[arg(long, conflicts_with = "no_cache")]
    pub clear_cache: bool,

    /// Remove cache entries for files not seen in this scan
    #[arg(long, conflicts_with = "no_cache")]
    pub prune_cache: bool,

    /// Give up on a single file after this many milliseconds
    #[arg(long = "budget-ms", value_name = "MS")]
    pub budget_ms: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Minimum file size to consider (e.g., 1KB, 1MiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum file size to consider (e.g., 1GB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Gitignore-style patterns to skip (can be repeated)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Only consider these extensions (default depends on the mode)
    #[arg(long, value_name = "EXT", value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Follow symbolic links during traversal
    #[arg(long)]
    pub follow_symlinks: bool,
}

/// Arguments for the cache subcommand.
#[derive(Debug, Args)]
pub struct CacheArgs {
    /// Cache database (default: platform cache directory)
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Action to perform
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache maintenance actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum CacheAction {
    /// Print the cache location and entry counts
    Info,
    /// Remove every entry
    Clear,
}

/// Arguments for the config subcommand.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Action to perform
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Output format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable listing
    Text,
    /// JSON document for scripting
    Json,
    /// One CSV row per group member
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Parse a human-readable size such as `1.5MB` or `4KiB` into bytes.
///
/// ```
/// use dupengine::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// ```
///
/// # Errors
///
/// Returns a message if the text is not a size.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    s.parse::<bytesize::ByteSize>()
        .map(|size| size.as_u64())
        .map_err(|e| format!("Invalid size '{s}': {e}"))
}
