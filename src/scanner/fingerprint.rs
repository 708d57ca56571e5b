//! Comparable fingerprint values.
//!
//! A [`Fingerprint`] is tagged with the mode that produced it. Values of
//! different modes are never compared with each other.

use serde::{Deserialize, Serialize};

use super::hasher::{hash_to_hex, Hash};
use super::ScanMode;

/// Fingerprint of one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Fingerprint {
    /// BLAKE3 digest of the full content.
    Exact(Hash),
    /// Mean luminance per cell of an N×N grid, row-major.
    Picture(BlockDigest),
    /// Normalised amplitude per time segment.
    Audio(BlockDigest),
}

impl Fingerprint {
    /// Mode that produced this fingerprint.
    #[must_use]
    pub fn mode(&self) -> ScanMode {
        match self {
            Self::Exact(_) => ScanMode::Exact,
            Self::Picture(_) => ScanMode::Picture,
            Self::Audio(_) => ScanMode::Audio,
        }
    }

    /// The content hash, for exact fingerprints.
    #[must_use]
    pub fn as_hash(&self) -> Option<&Hash> {
        match self {
            Self::Exact(hash) => Some(hash),
            _ => None,
        }
    }

    /// The block descriptors, for fuzzy fingerprints.
    #[must_use]
    pub fn as_blocks(&self) -> Option<&BlockDigest> {
        match self {
            Self::Picture(blocks) | Self::Audio(blocks) => Some(blocks),
            Self::Exact(_) => None,
        }
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(hash) => write!(f, "exact:{}", hash_to_hex(hash)),
            Self::Picture(blocks) => write!(f, "picture:{}", blocks.summary()),
            Self::Audio(blocks) => write!(f, "audio:{}", blocks.summary()),
        }
    }
}

/// Ordered sequence of block descriptors, each in `0..=255`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockDigest {
    cells: Vec<u8>,
}

impl BlockDigest {
    /// Wrap precomputed cell values.
    #[must_use]
    pub fn new(cells: Vec<u8>) -> Self {
        Self { cells }
    }

    /// The cell values.
    #[must_use]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the digest has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Sum of absolute per-cell differences, or `None` when the digests
    /// have different lengths.
    #[must_use]
    pub fn abs_diff_sum(&self, other: &Self) -> Option<u64> {
        if self.cells.len() != other.cells.len() {
            return None;
        }
        Some(
            self.cells
                .iter()
                .zip(&other.cells)
                .map(|(&a, &b)| u64::from(a.abs_diff(b)))
                .sum(),
        )
    }

    /// Sum of all cells.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.cells.iter().map(|&c| u64::from(c)).sum()
    }

    fn summary(&self) -> String {
        let mean = if self.cells.is_empty() {
            0.0
        } else {
            self.total() as f64 / self.cells.len() as f64
        };
        format!("{} cells, mean {:.1}", self.cells.len(), mean)
    }
}
