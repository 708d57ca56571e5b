//! Persistent fingerprint cache.
//!
//! Fingerprints are expensive to compute and cheap to store, so every
//! successful extraction is written to a key-value store and reused on the
//! next scan as long as the file's identity is unchanged.
//!
//! # Architecture
//!
//! * [`store`]: The [`KvStore`] contract plus an in-memory implementation.
//! * [`database`]: SQLite-backed [`KvStore`] for persistence across runs.
//! * [`entry`]: The serialized record and key layout.
//! * [`fingerprints`]: [`FingerprintCache`], the typed layer the engine
//!   talks to.
//!
//! # Cache Invalidation
//!
//! An entry is valid only when path, size and modification time all match
//! the identity being looked up. Anything else is stale: the entry is
//! evicted and the file is extracted again. Entries that fail to
//! deserialize are treated the same way.
//!
//! # Keys
//!
//! Keys are `"{namespace}:{path}"`. The namespace names the extractor and
//! its parameters (`exact`, `picture/16`, `audio/64`), so fingerprints
//! computed with different settings never mix.

pub mod database;
pub mod entry;
pub mod fingerprints;
pub mod store;

use std::path::PathBuf;

pub use database::SqliteStore;
pub use entry::{entry_key, split_key, CacheEntry};
pub use fingerprints::{CacheStats, FingerprintCache};
pub use store::{KvStore, MemoryStore};

/// Errors raised by cache storage.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error preparing the cache location.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A lock guarding the store was poisoned by a panicking thread.
    #[error("Cache lock poisoned")]
    Poisoned,

    /// The store cannot be used.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
