//! Scan orchestration.
//!
//! # Overview
//!
//! [`Engine::scan`] runs the whole pipeline over a batch of items supplied
//! by a traversal collaborator:
//!
//! 1. **Validate** the [`ScanConfig`]; invalid options fail before any work
//! 2. **Prepare** the batch: sort by path, drop repeated paths, extra
//!    links to one file and empty files, and in exact mode drop files whose
//!    size is unique
//! 3. **Extract** fingerprints on a bounded worker pool, serving unchanged
//!    files from the [`FingerprintCache`]
//! 4. **Match** the fingerprints into [`MatchEdge`](super::MatchEdge)s
//! 5. **Group** the edges and choose a reference per group
//!
//! Per-file failures never abort a scan; they are collected into
//! [`ScanResult::per_file_errors`]. Cache trouble becomes a
//! [`ScanWarning`]. Only invalid configuration and cancellation are
//! returned as [`EngineError`].
//!
//! # Example
//!
//! ```no_run
//! use dupengine::cache::FingerprintCache;
//! use dupengine::config::ScanConfig;
//! use dupengine::duplicates::Engine;
//! use dupengine::scanner::{walk_all, ScanMode, WalkerConfig};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! let (items, _walk_errors) = walk_all(&[PathBuf::from(".")], &WalkerConfig::default(), None);
//!
//! let engine = Engine::new(ScanConfig::new(ScanMode::Exact))
//!     .with_cache(Arc::new(FingerprintCache::in_memory()));
//! let result = engine.scan(items).unwrap();
//!
//! for group in &result.groups {
//!     println!("keep {}", group.reference().path.display());
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Serialize, Serializer};

use super::groups::{build_groups, DupeGroup};
use super::matcher::{DistanceStrategy, Matcher, MeanAbsoluteDistance};
use crate::cache::FingerprintCache;
use crate::config::{ConfigError, ScanConfig};
use crate::progress::{ProgressCallback, PHASE_EXTRACT};
use crate::scanner::{
    stored_path, ExtractionError, FileIdentity, Fingerprint, FingerprintExtractor, ItemKey,
    ScanMode,
};

/// Errors that end a scan call without a result.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The options were rejected before any work started.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The scan was cancelled (Ctrl+C or [`Engine::cancel`]).
    #[error("Scan interrupted after {processed} of {total} files")]
    Interrupted {
        /// Candidates fully processed before cancellation
        processed: usize,
        /// Candidates the scan intended to process
        total: usize,
    },
}

/// A file that could not be fingerprinted.
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    /// Path of the file, reported in its lossy display form
    #[serde(serialize_with = "stored_path::serialize_lossy")]
    pub path: PathBuf,
    /// Machine-readable error kind, e.g. `decode`
    pub kind: String,
    /// Human-readable description
    pub message: String,
    /// The underlying error
    #[serde(skip)]
    pub error: ExtractionError,
}

impl From<ExtractionError> for FileError {
    fn from(error: ExtractionError) -> Self {
        Self {
            path: error.path().to_path_buf(),
            kind: error.kind_name().to_string(),
            message: error.to_string(),
            error,
        }
    }
}

/// Non-fatal conditions worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum ScanWarning {
    /// The cache could not be used; every file was extracted.
    CacheUnavailable {
        /// The storage failure
        reason: String,
    },
    /// Empty files were left out of matching.
    EmptyFilesSkipped {
        /// Number of empty files
        count: usize,
    },
    /// The same path was supplied more than once.
    DuplicateItemsIgnored {
        /// Number of repeated entries dropped
        count: usize,
    },
    /// Several paths named the same file on disk (hardlinks or followed
    /// symlinks); only the first in path order was kept.
    SameFileIgnored {
        /// Number of extra paths dropped
        count: usize,
    },
    /// The priority rule could not rank some groups; path order was used.
    PriorityFallback {
        /// Number of affected groups
        groups: usize,
    },
    /// Removing entries for vanished files failed.
    CachePruneFailed {
        /// The storage failure
        reason: String,
    },
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheUnavailable { reason } => {
                write!(f, "Fingerprint cache unavailable, all files recomputed: {reason}")
            }
            Self::EmptyFilesSkipped { count } => write!(f, "Skipped {count} empty file(s)"),
            Self::DuplicateItemsIgnored { count } => {
                write!(f, "Ignored {count} repeated path(s)")
            }
            Self::SameFileIgnored { count } => {
                write!(f, "Ignored {count} path(s) linking to a file already listed")
            }
            Self::PriorityFallback { groups } => write!(
                f,
                "Priority rule could not rank {groups} group(s); path order used"
            ),
            Self::CachePruneFailed { reason } => write!(f, "Cache pruning failed: {reason}"),
        }
    }
}

/// Counters describing one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanStats {
    /// Items supplied by the caller
    pub total_items: usize,
    /// Items that needed a fingerprint
    pub candidates: usize,
    /// Fingerprints computed from file content
    pub extracted: usize,
    /// Fingerprints served by the cache
    pub cache_hits: usize,
    /// Candidates the cache could not serve
    pub cache_misses: usize,
    /// Cache entries invalidated by an identity change
    pub stale_entries: usize,
    /// Exact-mode files skipped because no other file has their size
    pub skipped_unique_size: usize,
    /// Empty files skipped
    pub skipped_empty: usize,
    /// Candidates that failed extraction
    pub failed: usize,
    /// Match edges found
    pub match_edges: usize,
    /// Duplicate groups found
    pub duplicate_groups: usize,
    /// Members of all groups, references excluded
    pub duplicate_items: usize,
    /// Bytes held by non-reference members
    pub reclaimable_bytes: u64,
    /// Cache entries removed by pruning
    pub cache_pruned: usize,
    /// Wall-clock time of the scan
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Outcome of a completed scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    /// Duplicate groups ordered by reference path
    pub groups: Vec<DupeGroup>,
    /// Files that could not be fingerprinted, by path
    pub per_file_errors: Vec<FileError>,
    /// Non-fatal conditions
    pub warnings: Vec<ScanWarning>,
    /// Counters
    pub stats: ScanStats,
}

impl ScanResult {
    /// Whether any group was found.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Whether the result carries errors or warnings.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.per_file_errors.is_empty() || !self.warnings.is_empty()
    }
}

/// What happened to one candidate.
enum Outcome {
    Cached(Fingerprint),
    Extracted(Fingerprint),
    Failed(ExtractionError),
    Skipped,
}

/// The duplicate detection engine.
///
/// Holds the scan options and the collaborators shared across scans. The
/// cache is an explicit handle, so several engines may use independent
/// caches in one process.
pub struct Engine {
    config: ScanConfig,
    cache: Option<Arc<FingerprintCache>>,
    shutdown_flag: Arc<AtomicBool>,
    progress: Option<Arc<dyn ProgressCallback>>,
    strategy: Arc<dyn DistanceStrategy>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("cache", &self.cache.as_ref().map(|_| "<cache>"))
            .field("shutdown_flag", &self.shutdown_flag)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl Engine {
    /// Create an engine without a cache.
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            cache: None,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            progress: None,
            strategy: Arc::new(MeanAbsoluteDistance),
        }
    }

    /// Use a fingerprint cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<FingerprintCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share a cancellation flag, e.g. the one raised by Ctrl+C.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = flag;
        self
    }

    /// Report extraction progress.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Replace the fuzzy distance function.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn DistanceStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Options used by [`scan`](Self::scan).
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// The cancellation flag.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Ask a running scan to stop.
    ///
    /// Workers finish the file they are on and take no new ones. The flag
    /// stays raised until [`reset_cancellation`](Self::reset_cancellation).
    pub fn cancel(&self) {
        log::info!("Cancellation requested");
        self.shutdown_flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Lower the cancellation flag so the engine can scan again.
    pub fn reset_cancellation(&self) {
        self.shutdown_flag.store(false, Ordering::SeqCst);
    }

    /// Scan `items` with the engine's own options.
    ///
    /// # Errors
    ///
    /// See [`scan_with_config`](Self::scan_with_config).
    pub fn scan(&self, items: Vec<FileIdentity>) -> Result<ScanResult, EngineError> {
        self.scan_with_config(items, &self.config)
    }

    /// Scan `items` with explicit options.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidConfig`] if `config` fails validation; no
    ///   file is touched in that case
    /// - [`EngineError::Interrupted`] if the scan was cancelled. Cache
    ///   entries written before cancellation remain valid.
    pub fn scan_with_config(
        &self,
        items: Vec<FileIdentity>,
        config: &ScanConfig,
    ) -> Result<ScanResult, EngineError> {
        config.validate()?;

        let start = Instant::now();
        let mut result = ScanResult::default();
        result.stats.total_items = items.len();

        let items = prepare_items(items, &mut result);
        let candidates = select_candidates(&items, config.mode, &mut result.stats);
        result.stats.candidates = candidates.len();

        log::info!(
            "Scanning {} items in {} mode: {} candidates, {} workers",
            result.stats.total_items,
            config.mode,
            candidates.len(),
            config.worker_count
        );

        let cache = self.cache.as_deref();
        let stale_before = cache.map_or(0, |c| c.stats().stale);

        let outcomes = self.extract_all(&items, &candidates, config);

        if let Some(ref callback) = self.progress {
            callback.on_phase_end(PHASE_EXTRACT);
        }

        if self.is_cancelled() {
            let processed = outcomes
                .iter()
                .filter(|(_, o)| !matches!(o, Outcome::Skipped))
                .count();
            log::info!(
                "Scan interrupted: {} of {} candidates processed",
                processed,
                candidates.len()
            );
            return Err(EngineError::Interrupted {
                processed,
                total: candidates.len(),
            });
        }

        if let Some(cache) = cache {
            if cache.is_degraded() {
                let reason = cache
                    .degraded_reason()
                    .unwrap_or_else(|| "unknown storage error".to_string());
                result.warnings.push(ScanWarning::CacheUnavailable { reason });
            }
            let stale_after = cache.stats().stale;
            result.stats.stale_entries = usize::try_from(stale_after.saturating_sub(stale_before))
                .unwrap_or(usize::MAX);
        }

        let mut fingerprints: Vec<(usize, Fingerprint)> = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes {
            match outcome {
                Outcome::Cached(fp) => {
                    result.stats.cache_hits += 1;
                    fingerprints.push((index, fp));
                }
                Outcome::Extracted(fp) => {
                    result.stats.extracted += 1;
                    fingerprints.push((index, fp));
                }
                Outcome::Failed(error) => {
                    result.stats.failed += 1;
                    result.per_file_errors.push(FileError::from(error));
                }
                Outcome::Skipped => {}
            }
        }
        result.stats.cache_misses = result.stats.candidates - result.stats.cache_hits;

        let matcher =
            Matcher::new(config.mode, config.threshold).with_strategy(Arc::clone(&self.strategy));
        let entries: Vec<(usize, &Fingerprint)> =
            fingerprints.iter().map(|(i, fp)| (*i, fp)).collect();
        let edges = matcher.find_matches(&entries);
        result.stats.match_edges = edges.len();

        let built = build_groups(&items, &edges, &config.priority, config.mode);
        if !built.fallback_groups.is_empty() {
            result.warnings.push(ScanWarning::PriorityFallback {
                groups: built.fallback_groups.len(),
            });
        }
        result.groups = built.groups;

        if config.prune_cache {
            if let Some(cache) = cache {
                match cache.prune(&items) {
                    Ok(removed) => result.stats.cache_pruned = removed,
                    Err(e) => {
                        log::warn!("Cache pruning failed: {}", e);
                        result
                            .warnings
                            .push(ScanWarning::CachePruneFailed { reason: e.to_string() });
                    }
                }
            }
        }

        result.stats.duplicate_groups = result.groups.len();
        result.stats.duplicate_items = result.groups.iter().map(|g| g.len() - 1).sum();
        result.stats.reclaimable_bytes = result.groups.iter().map(DupeGroup::reclaimable_bytes).sum();
        result.stats.duration = start.elapsed();

        log::info!(
            "Scan complete: {} groups, {} duplicates, {} extracted, {} cached, {} failed in {:?}",
            result.stats.duplicate_groups,
            result.stats.duplicate_items,
            result.stats.extracted,
            result.stats.cache_hits,
            result.stats.failed,
            result.stats.duration
        );

        Ok(result)
    }

    /// Fingerprint every candidate on the worker pool.
    ///
    /// The returned outcomes are in candidate order regardless of which
    /// worker finished first.
    fn extract_all(
        &self,
        items: &[FileIdentity],
        candidates: &[usize],
        config: &ScanConfig,
    ) -> Vec<(usize, Outcome)> {
        if let Some(ref callback) = self.progress {
            callback.on_phase_start(PHASE_EXTRACT, candidates.len());
        }

        let extractor =
            FingerprintExtractor::with_params(config.mode, config.grid_size, config.audio_segments)
                .with_shutdown_flag(Arc::clone(&self.shutdown_flag));
        let namespace = extractor.namespace();
        let budget = config.extraction_budget();
        let completed = AtomicUsize::new(0);

        let run = || -> Vec<(usize, Outcome)> {
            candidates
                .par_iter()
                .map(|&index| {
                    let identity = &items[index];
                    let outcome = self.process_one(&extractor, &namespace, identity, budget);
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(ref callback) = self.progress {
                        callback.on_progress(done, identity.path.to_string_lossy().as_ref());
                    }
                    (index, outcome)
                })
                .collect()
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count)
            .thread_name(|i| format!("dupengine-worker-{i}"))
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                log::warn!(
                    "Failed to create worker pool, using global pool with {} threads: {}",
                    rayon::current_num_threads(),
                    e
                );
                run()
            }
        }
    }

    fn process_one(
        &self,
        extractor: &FingerprintExtractor,
        namespace: &str,
        identity: &FileIdentity,
        budget: Option<Duration>,
    ) -> Outcome {
        if self.is_cancelled() {
            return Outcome::Skipped;
        }

        if let Some(ref cache) = self.cache {
            match cache.lookup(namespace, identity) {
                Ok(Some(fingerprint)) => return Outcome::Cached(fingerprint),
                Ok(None) => {}
                Err(e) => log::warn!(
                    "Cache lookup failed for {}: {}",
                    identity.path.display(),
                    e
                ),
            }
        }

        let extracted = match budget {
            Some(budget) => extractor.extract_with_budget(identity, budget),
            None => extractor.extract(identity),
        };

        match extracted {
            Ok(fingerprint) => {
                if let Some(ref cache) = self.cache {
                    if let Err(e) = cache.store(namespace, identity, &fingerprint) {
                        log::warn!(
                            "Failed to update cache for {}: {}",
                            identity.path.display(),
                            e
                        );
                    }
                }
                Outcome::Extracted(fingerprint)
            }
            Err(ExtractionError::Interrupted(path)) => {
                log::debug!("Extraction interrupted: {}", path.display());
                Outcome::Skipped
            }
            Err(e) => {
                log::warn!("Failed to fingerprint {}: {}", identity.path.display(), e);
                Outcome::Failed(e)
            }
        }
    }
}

/// Sort by path, drop repeated paths and extra links, count empty files.
///
/// A path supplied more than once keeps the identity supplied last, as the
/// most recent observation of that file. Paths that resolve to one file on
/// disk keep only the first in path order, so a file is never reported as a
/// duplicate of itself. Paths that cannot be stat'ed are kept and fail
/// later as per-file errors.
fn prepare_items(items: Vec<FileIdentity>, result: &mut ScanResult) -> Vec<FileIdentity> {
    let before = items.len();
    let mut indexed: Vec<(usize, FileIdentity)> = items.into_iter().enumerate().collect();
    indexed.sort_by(|(i, x), (j, y)| x.path.cmp(&y.path).then(j.cmp(i)));
    indexed.dedup_by(|next, kept| next.1.path == kept.1.path);
    let items: Vec<FileIdentity> = indexed.into_iter().map(|(_, id)| id).collect();

    let repeated = before - items.len();
    if repeated > 0 {
        log::warn!("Ignoring {} repeated path(s)", repeated);
        result
            .warnings
            .push(ScanWarning::DuplicateItemsIgnored { count: repeated });
    }

    let keys: Vec<Option<ItemKey>> = items
        .par_iter()
        .map(|id| ItemKey::for_path(&id.path))
        .collect();
    let mut seen = HashSet::with_capacity(items.len());
    let items: Vec<FileIdentity> = items
        .into_iter()
        .zip(keys)
        .filter_map(|(id, key)| match key {
            Some(key) if !seen.insert(key.clone()) => {
                log::debug!("Same file as an earlier path, skipped: {}", id.path.display());
                None
            }
            _ => Some(id),
        })
        .collect();
    let aliases = before - repeated - items.len();
    if aliases > 0 {
        log::warn!("Ignoring {} extra link(s) to already listed files", aliases);
        result
            .warnings
            .push(ScanWarning::SameFileIgnored { count: aliases });
    }

    let empty = items.iter().filter(|id| id.size == 0).count();
    if empty > 0 {
        log::debug!("Skipping {} empty file(s)", empty);
        result.stats.skipped_empty = empty;
        result
            .warnings
            .push(ScanWarning::EmptyFilesSkipped { count: empty });
    }
    items
}

/// Indices of the items that need a fingerprint.
///
/// Empty files never match. In exact mode a file whose size no other
/// file shares cannot have a byte-identical twin.
fn select_candidates(items: &[FileIdentity], mode: ScanMode, stats: &mut ScanStats) -> Vec<usize> {
    let non_empty = (0..items.len()).filter(|&i| items[i].size > 0);
    if mode.is_fuzzy() {
        return non_empty.collect();
    }

    let mut by_size: HashMap<u64, usize> = HashMap::new();
    for item in items.iter().filter(|id| id.size > 0) {
        *by_size.entry(item.size).or_default() += 1;
    }

    let mut candidates = Vec::new();
    for index in non_empty {
        if by_size.get(&items[index].size).copied().unwrap_or(0) > 1 {
            candidates.push(index);
        } else {
            stats.skipped_unique_size += 1;
            log::trace!("Unique size, skipped: {}", items[index].path.display());
        }
    }
    log::debug!(
        "Size filter: {} candidates, {} unique sizes",
        candidates.len(),
        stats.skipped_unique_size
    );
    candidates
}
