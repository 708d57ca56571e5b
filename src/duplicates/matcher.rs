//! Similarity matching over extracted fingerprints.
//!
//! # Overview
//!
//! The matcher turns a set of fingerprints into [`MatchEdge`]s between the
//! items they belong to.
//!
//! - **Exact mode** sorts by hash and links each run of equal hashes in a
//!   star around its lowest item index. That is O(n log n) and yields
//!   exactly the connected components that the full pairwise graph would.
//! - **Fuzzy modes** sort digests by a coarse key and only compare pairs
//!   whose keys are within the threshold. The coarse key of a
//!   [`DistanceStrategy`] never differs by more than the distance itself,
//!   so the prefilter drops no pair that could match.
//!
//! The resulting edge set depends only on the fingerprints, the mode and
//! the threshold. Edges are returned sorted so callers also get a stable
//! order.
//!
//! # Example
//!
//! ```
//! use dupengine::duplicates::Matcher;
//! use dupengine::scanner::{BlockDigest, Fingerprint, ScanMode};
//!
//! let a = Fingerprint::Picture(BlockDigest::new(vec![100; 16]));
//! let b = Fingerprint::Picture(BlockDigest::new(vec![102; 16]));
//! let c = Fingerprint::Picture(BlockDigest::new(vec![10; 16]));
//!
//! let matcher = Matcher::new(ScanMode::Picture, 0.05);
//! let edges = matcher.find_matches(&[(0, &a), (1, &b), (2, &c)]);
//! assert_eq!(edges.len(), 1);
//! assert_eq!((edges[0].a, edges[0].b), (0, 1));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::scanner::{BlockDigest, Fingerprint, Hash, ScanMode};

/// Slack added to the coarse-key window to absorb floating point rounding.
const KEY_EPSILON: f64 = 1e-9;

/// A match between two items, identified by index.
///
/// `a < b` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchEdge {
    /// Lower item index
    pub a: usize,
    /// Higher item index
    pub b: usize,
    /// Similarity in `[0, 1]`; 1.0 for exact matches
    pub score: f64,
}

impl MatchEdge {
    /// Create an edge, normalising the endpoint order.
    #[must_use]
    pub fn new(x: usize, y: usize, score: f64) -> Self {
        Self {
            a: x.min(y),
            b: x.max(y),
            score: score.clamp(0.0, 1.0),
        }
    }
}

/// Distance between two block digests.
///
/// Implementations must be symmetric and return values in `[0, 1]`, with
/// 0 meaning identical.
pub trait DistanceStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Distance between two digests, or `None` if they are not comparable
    /// (different lengths).
    fn distance(&self, a: &BlockDigest, b: &BlockDigest) -> Option<f64>;

    /// Scalar key used to prefilter candidate pairs.
    ///
    /// For every pair, `|coarse_key(a) - coarse_key(b)|` must not exceed
    /// `distance(a, b)`. The default constant key satisfies this trivially
    /// and disables the prefilter.
    fn coarse_key(&self, _digest: &BlockDigest) -> f64 {
        0.0
    }

    /// Whether two digests match under `threshold`. The matcher decides
    /// every pair with this rule.
    ///
    /// Overrides may reject pairs the default accepts. Pairs whose coarse
    /// keys differ by more than `threshold` are never offered.
    fn within(&self, a: &BlockDigest, b: &BlockDigest, threshold: f64) -> bool {
        self.distance(a, b).is_some_and(|d| d <= threshold)
    }
}

/// Mean absolute per-cell difference, normalised by 255.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAbsoluteDistance;

impl DistanceStrategy for MeanAbsoluteDistance {
    fn name(&self) -> &'static str {
        "mean-absolute"
    }

    fn distance(&self, a: &BlockDigest, b: &BlockDigest) -> Option<f64> {
        let sum = a.abs_diff_sum(b)?;
        if a.is_empty() {
            return Some(0.0);
        }
        Some(sum as f64 / (a.len() as f64 * 255.0))
    }

    fn coarse_key(&self, digest: &BlockDigest) -> f64 {
        if digest.is_empty() {
            return 0.0;
        }
        digest.total() as f64 / (digest.len() as f64 * 255.0)
    }
}

/// Emits match edges for one mode and threshold.
#[derive(Clone)]
pub struct Matcher {
    mode: ScanMode,
    threshold: f64,
    strategy: Arc<dyn DistanceStrategy>,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("mode", &self.mode)
            .field("threshold", &self.threshold)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

impl Matcher {
    /// Create a matcher with the default [`MeanAbsoluteDistance`].
    ///
    /// `threshold` is the largest accepted distance; it is ignored in
    /// exact mode.
    #[must_use]
    pub fn new(mode: ScanMode, threshold: f64) -> Self {
        Self {
            mode,
            threshold,
            strategy: Arc::new(MeanAbsoluteDistance),
        }
    }

    /// Use a different distance strategy for fuzzy modes.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn DistanceStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Mode this matcher compares.
    #[must_use]
    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Find all match edges among `entries`, given as `(item index,
    /// fingerprint)` pairs.
    ///
    /// Fingerprints of another mode are ignored. Entries sharing an item
    /// index never match each other. The result is sorted by `(a, b)`.
    #[must_use]
    pub fn find_matches(&self, entries: &[(usize, &Fingerprint)]) -> Vec<MatchEdge> {
        let mut edges = if self.mode.is_fuzzy() {
            self.fuzzy_matches(entries)
        } else {
            self.exact_matches(entries)
        };
        edges.sort_by(|x, y| (x.a, x.b).cmp(&(y.a, y.b)));
        edges.dedup_by(|x, y| x.a == y.a && x.b == y.b);
        log::debug!(
            "Matcher ({}, threshold {}): {} fingerprints, {} edges",
            self.mode,
            self.threshold,
            entries.len(),
            edges.len()
        );
        edges
    }

    fn exact_matches(&self, entries: &[(usize, &Fingerprint)]) -> Vec<MatchEdge> {
        let mut hashed: Vec<(&Hash, usize)> = entries
            .iter()
            .filter_map(|(index, fp)| fp.as_hash().map(|h| (h, *index)))
            .collect();
        hashed.sort_unstable();

        let mut edges = Vec::new();
        for run in hashed.chunk_by(|x, y| x.0 == y.0) {
            let anchor = run[0].1;
            edges.extend(
                run[1..]
                    .iter()
                    .filter(|(_, index)| *index != anchor)
                    .map(|(_, index)| MatchEdge::new(anchor, *index, 1.0)),
            );
        }
        edges
    }

    fn fuzzy_matches(&self, entries: &[(usize, &Fingerprint)]) -> Vec<MatchEdge> {
        // Digests of different lengths are never comparable.
        let mut buckets: BTreeMap<usize, Vec<(f64, usize, &BlockDigest)>> = BTreeMap::new();
        for (index, fp) in entries {
            if fp.mode() != self.mode {
                continue;
            }
            if let Some(blocks) = fp.as_blocks() {
                buckets.entry(blocks.len()).or_default().push((
                    self.strategy.coarse_key(blocks),
                    *index,
                    blocks,
                ));
            }
        }

        let window = self.threshold + KEY_EPSILON;
        let strategy = self.strategy.as_ref();
        let threshold = self.threshold;

        buckets
            .into_values()
            .flat_map(|mut bucket| {
                bucket.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
                (0..bucket.len())
                    .into_par_iter()
                    .flat_map_iter(|i| {
                        let (key_i, index_i, digest_i) = bucket[i];
                        bucket[i + 1..]
                            .iter()
                            .take_while(move |(key_j, _, _)| key_j - key_i <= window)
                            .filter(move |(_, index_j, _)| *index_j != index_i)
                            .filter(move |(_, _, digest_j)| {
                                strategy.within(digest_i, digest_j, threshold)
                            })
                            .map(move |(_, index_j, digest_j)| {
                                let d = strategy.distance(digest_i, digest_j).unwrap_or(threshold);
                                MatchEdge::new(index_i, *index_j, 1.0 - d)
                            })
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
