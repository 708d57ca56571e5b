//! Fingerprint extraction for duplicate detection.
//!
//! This module provides functionality for:
//! - Describing a file by its cache identity ([`FileIdentity`])
//! - Exact content fingerprints with BLAKE3
//! - Picture fingerprints built from a grid of luminance blocks
//! - Audio fingerprints built from an amplitude envelope
//! - A reference directory traversal collaborator
//!
//! # Architecture
//!
//! - [`walker`]: Directory traversal producing [`FileIdentity`] values
//! - [`hasher`]: BLAKE3 streaming hasher (exact mode)
//! - [`perceptual`]: Block-grid digests for pictures
//! - [`audio`]: Envelope digests for RIFF/WAVE audio
//! - [`extractor`]: Mode dispatch and per-file budgets
//! - [`fingerprint`]: The comparable fingerprint values
//!
//! # Example
//!
//! ```no_run
//! use dupengine::scanner::{FileIdentity, FingerprintExtractor, ScanMode};
//! use std::path::Path;
//!
//! let identity = FileIdentity::from_path(Path::new("photo.png")).unwrap();
//! let extractor = FingerprintExtractor::new(ScanMode::Picture);
//! let fingerprint = extractor.extract(&identity).unwrap();
//! println!("{}", fingerprint);
//! ```

pub mod audio;
pub mod extractor;
pub mod fingerprint;
pub mod hasher;
pub mod perceptual;
pub(crate) mod stored_path;
pub mod walker;

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

pub use audio::{AudioExtractor, DEFAULT_SEGMENTS};
pub use extractor::{Extract, FingerprintExtractor};
pub use fingerprint::{BlockDigest, Fingerprint};
pub use hasher::{hash_to_hex, hex_to_hash, Hash, Hasher, BLOCK_SIZE};
pub use perceptual::{PictureExtractor, DEFAULT_GRID_SIZE};
pub use walker::{walk_all, LinkTracker, WalkError, Walker, WalkerConfig};

/// Identity of a file as seen by the fingerprint cache.
///
/// Two identities are equal only when path, size and modification time
/// all match. Any difference means the cached fingerprint is stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    /// Path to the file
    #[serde(with = "crate::scanner::stored_path")]
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileIdentity {
    /// Create a new identity.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }

    /// Build an identity from metadata already obtained by the caller.
    ///
    /// Platforms that cannot report a modification time fall back to the
    /// Unix epoch, which still compares consistently across scans.
    #[must_use]
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Self::new(path, metadata.len(), modified)
    }

    /// Stat a path and build its identity.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::NotAFile`] for directories and other
    /// non-regular files, or the mapped I/O error when the path cannot be
    /// inspected.
    pub fn from_path(path: &Path) -> Result<Self, ExtractionError> {
        let metadata = std::fs::metadata(path).map_err(|e| ExtractionError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(ExtractionError::NotAFile(path.to_path_buf()));
        }
        Ok(Self::from_metadata(path.to_path_buf(), &metadata))
    }

    /// Lowercase file extension without the leading dot.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Whether both identities refer to the same underlying item.
    ///
    /// Equal paths always do. Different paths do when they resolve to the
    /// same file on disk, as hardlinks and symlinks to one file do.
    #[must_use]
    pub fn same_item(&self, other: &Self) -> bool {
        if self.path == other.path {
            return true;
        }
        match (ItemKey::for_path(&self.path), ItemKey::for_path(&other.path)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// The underlying file a path resolves to, independent of the name used to
/// reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKey {
    /// Device and inode number.
    Inode {
        /// Device id
        dev: u64,
        /// Inode number on that device
        ino: u64,
    },
    /// Fully resolved path, where inode numbers are not available.
    Canonical(PathBuf),
}

impl ItemKey {
    /// Resolve `path`, following symlinks. `None` when it cannot be stat'ed.
    #[must_use]
    pub fn for_path(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        Self::from_metadata(path, &metadata)
    }

    /// Key for a file whose metadata the caller already holds.
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(_path: &Path, metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(Self::Inode {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    /// Key for a file whose metadata the caller already holds.
    #[cfg(not(unix))]
    #[must_use]
    pub fn from_metadata(path: &Path, _metadata: &Metadata) -> Option<Self> {
        std::fs::canonicalize(path).ok().map(Self::Canonical)
    }
}

/// Detection mode, selecting both the extractor and the matcher.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Default,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Byte-identical content, compared by BLAKE3 hash.
    #[default]
    Exact,
    /// Visually similar pictures, compared by block grid distance.
    Picture,
    /// Similar audio recordings, compared by envelope distance.
    Audio,
}

impl ScanMode {
    /// Whether this mode tolerates differences up to a threshold.
    #[must_use]
    pub fn is_fuzzy(self) -> bool {
        !matches!(self, Self::Exact)
    }

    /// Extensions a traversal collaborator should offer for this mode.
    ///
    /// An empty slice means every file is a candidate.
    #[must_use]
    pub fn default_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Exact => &[],
            Self::Picture => &["png", "gif", "bmp", "tif", "tiff", "webp"],
            Self::Audio => &["wav", "wave"],
        }
    }
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Picture => write!(f, "picture"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Errors that can occur while extracting a fingerprint.
///
/// Each variant is reported per file; none of them aborts a scan.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ExtractionError {
    /// The file disappeared before it could be read.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Any other I/O failure while reading.
    #[error("I/O error for {path}: {source}")]
    Unreadable {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The file has no content to fingerprint.
    #[error("Empty file: {0}")]
    Empty(PathBuf),

    /// The path is a directory or special file.
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),

    /// The content is corrupt for its declared format.
    #[error("Failed to decode {path}: {reason}")]
    Decode {
        /// Path of the corrupt file
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// The format is not understood by the selected mode.
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat {
        /// Path of the file
        path: PathBuf,
        /// Description of the rejected format
        format: String,
    },

    /// Extraction did not finish within the caller-supplied budget.
    #[error("Extraction of {path} exceeded its budget of {budget:?}")]
    TimedOut {
        /// Path of the file
        path: PathBuf,
        /// The budget that was exceeded
        budget: Duration,
    },

    /// The scan was cancelled while this file was being read.
    #[error("Extraction interrupted: {0}")]
    Interrupted(PathBuf),
}

impl ExtractionError {
    /// Map an I/O error onto the matching extraction error kind.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            ErrorKind::Interrupted => Self::Interrupted(path.to_path_buf()),
            _ => Self::Unreadable {
                path: path.to_path_buf(),
                source: Arc::new(error),
            },
        }
    }

    /// Path of the file this error belongs to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path)
            | Self::PermissionDenied(path)
            | Self::Empty(path)
            | Self::NotAFile(path)
            | Self::Interrupted(path) => path,
            Self::Unreadable { path, .. }
            | Self::Decode { path, .. }
            | Self::UnsupportedFormat { path, .. }
            | Self::TimedOut { path, .. } => path,
        }
    }

    /// Stable machine-readable name of the error kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Unreadable { .. } => "unreadable",
            Self::Empty(_) => "empty",
            Self::NotAFile(_) => "not_a_file",
            Self::Decode { .. } => "decode",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::TimedOut { .. } => "timed_out",
            Self::Interrupted(_) => "interrupted",
        }
    }
}
