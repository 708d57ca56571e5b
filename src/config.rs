//! Scan options and application configuration.
//!
//! [`ScanConfig`] is the option set the engine recognises; it is checked
//! with [`ScanConfig::validate`] before a scan does any work.
//!
//! [`Config`] is the persisted application configuration used by the
//! binary. Layers, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory (or `--config PATH`)
//! 3. Environment variables prefixed `DUPENGINE_`, with `__` for nesting
//!    (e.g. `DUPENGINE_SCAN__THRESHOLD=0.1`)
//! 4. Command-line flags, applied by the caller

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::duplicates::PriorityRule;
use crate::scanner::audio::{MAX_SEGMENTS, MIN_SEGMENTS};
use crate::scanner::perceptual::{MAX_GRID_SIZE, MIN_GRID_SIZE};
use crate::scanner::{ScanMode, DEFAULT_GRID_SIZE, DEFAULT_SEGMENTS};

/// Default fuzzy-match threshold (largest accepted distance).
pub const DEFAULT_THRESHOLD: f64 = 0.05;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DUPENGINE_";

/// Invalid options or unreadable configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Threshold is not a finite number in `[0, 1]`.
    #[error("Threshold must be between 0.0 and 1.0, got {0}")]
    InvalidThreshold(f64),

    /// No extraction workers.
    #[error("Worker count must be at least 1")]
    InvalidWorkerCount,

    /// Picture grid outside the supported range.
    #[error("Grid size must be between 2 and 64, got {0}")]
    InvalidGridSize(u32),

    /// Audio segment count outside the supported range.
    #[error("Audio segment count must be between 2 and 1024, got {0}")]
    InvalidAudioSegments(u32),

    /// A zero extraction budget would time out every file.
    #[error("Extraction budget must be greater than zero")]
    InvalidBudget,

    /// The layered configuration could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(#[source] Box<figment::Error>),

    /// The configuration could not be encoded.
    #[error("Failed to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    /// The configuration file could not be written.
    #[error("Failed to write configuration to {path}: {source}")]
    Write {
        /// Target path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Options for one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Detection mode
    pub mode: ScanMode,
    /// Largest accepted fuzzy distance, in `[0, 1]`; ignored in exact mode
    pub threshold: f64,
    /// Reference selection rule
    pub priority: PriorityRule,
    /// Number of extraction workers
    pub worker_count: usize,
    /// Picture grid edge length
    pub grid_size: u32,
    /// Audio envelope segment count
    pub audio_segments: u32,
    /// Optional per-file extraction budget in milliseconds
    pub extraction_budget_ms: Option<u64>,
    /// Remove cache entries for files absent from a completed scan
    pub prune_cache: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::Exact,
            threshold: DEFAULT_THRESHOLD,
            priority: PriorityRule::default(),
            worker_count: default_worker_count(),
            grid_size: DEFAULT_GRID_SIZE,
            audio_segments: DEFAULT_SEGMENTS,
            extraction_budget_ms: None,
            prune_cache: false,
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}

impl ScanConfig {
    /// Defaults for `mode`.
    #[must_use]
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Set the fuzzy threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the reference selection rule.
    #[must_use]
    pub fn with_priority(mut self, priority: PriorityRule) -> Self {
        self.priority = priority;
        self
    }

    /// Set the number of extraction workers.
    #[must_use]
    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    /// Set the picture grid edge length.
    #[must_use]
    pub fn with_grid_size(mut self, grid_size: u32) -> Self {
        self.grid_size = grid_size;
        self
    }

    /// Set the audio segment count.
    #[must_use]
    pub fn with_audio_segments(mut self, segments: u32) -> Self {
        self.audio_segments = segments;
        self
    }

    /// Set the per-file extraction budget.
    #[must_use]
    pub fn with_extraction_budget(mut self, budget: Option<Duration>) -> Self {
        self.extraction_budget_ms = budget.map(|b| u64::try_from(b.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Enable or disable cache pruning after a completed scan.
    #[must_use]
    pub fn with_prune_cache(mut self, prune: bool) -> Self {
        self.prune_cache = prune;
        self
    }

    /// Per-file budget as a duration.
    #[must_use]
    pub fn extraction_budget(&self) -> Option<Duration> {
        self.extraction_budget_ms.map(Duration::from_millis)
    }

    /// Reject option combinations the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first invalid option found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }
        if !(MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&self.grid_size) {
            return Err(ConfigError::InvalidGridSize(self.grid_size));
        }
        if !(MIN_SEGMENTS..=MAX_SEGMENTS).contains(&self.audio_segments) {
            return Err(ConfigError::InvalidAudioSegments(self.audio_segments));
        }
        if self.extraction_budget_ms == Some(0) {
            return Err(ConfigError::InvalidBudget);
        }
        Ok(())
    }
}

/// Walker options stored in the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Follow symbolic links
    pub follow_symlinks: bool,
    /// Skip hidden files and directories
    pub skip_hidden: bool,
    /// Gitignore-style patterns to exclude
    pub ignore_patterns: Vec<String>,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scan options
    pub scan: ScanConfig,
    /// Walker options
    pub walk: WalkConfig,
    /// Fingerprint database location; platform cache dir when unset
    pub cache_path: Option<PathBuf>,
    /// Whether to use the persistent cache at all
    pub use_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            walk: WalkConfig::default(),
            cache_path: None,
            use_cache: true,
        }
    }
}

impl Config {
    /// The layered provider chain, without extracting.
    ///
    /// `path` overrides the default config file location.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = path.map(Path::to_path_buf).or_else(Self::default_path) {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load the layered configuration.
    ///
    /// A missing file is not an error; a malformed one is.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a layer cannot be parsed or a value
    /// has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path)
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))?;
        log::debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Platform config file location, e.g. `~/.config/dupengine/config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "dupengine", "dupengine")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
