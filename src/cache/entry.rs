//! Cache record layout.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scanner::{FileIdentity, Fingerprint};

/// A stored fingerprint together with the identity it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Path of the file, stored byte for byte
    #[serde(with = "crate::scanner::stored_path")]
    pub path: PathBuf,
    /// Size in bytes at extraction time
    pub size: u64,
    /// Modification time at extraction time
    pub modified: SystemTime,
    /// The extracted fingerprint
    pub fingerprint: Fingerprint,
    /// When the fingerprint was computed
    pub last_verified: DateTime<Utc>,
}

impl CacheEntry {
    /// Record `fingerprint` for `identity`, stamped with the current time.
    #[must_use]
    pub fn new(identity: &FileIdentity, fingerprint: Fingerprint) -> Self {
        Self {
            path: identity.path.clone(),
            size: identity.size,
            modified: identity.modified,
            fingerprint,
            last_verified: Utc::now(),
        }
    }

    /// Whether this entry still describes `identity`.
    #[must_use]
    pub fn is_valid_for(&self, identity: &FileIdentity) -> bool {
        self.path == identity.path && self.size == identity.size && self.modified == identity.modified
    }

    /// Encode as JSON bytes.
    ///
    /// # Errors
    ///
    /// Fails only if the fingerprint cannot be represented, which does not
    /// happen for the built-in fingerprint kinds.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error for truncated or foreign data.
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Key under which the fingerprint of `path` is stored in `namespace`.
///
/// Paths that are not valid Unicode are keyed by their lossy form. The
/// entry itself keeps the exact path, which validation compares.
#[must_use]
pub fn entry_key(namespace: &str, path: &Path) -> String {
    format!("{}:{}", namespace, path.to_string_lossy())
}

/// Split a key produced by [`entry_key`] into namespace and path.
#[must_use]
pub fn split_key(key: &str) -> Option<(&str, &Path)> {
    key.split_once(':')
        .map(|(namespace, path)| (namespace, Path::new(path)))
}
