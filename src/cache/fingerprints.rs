//! Typed fingerprint cache over a [`KvStore`].
//!
//! # Concurrency
//!
//! Any number of workers may look up and store entries at once. Writes
//! and stale-entry evictions of the same key are serialized through a
//! small set of shard locks, so an eviction never removes an entry that
//! another worker has just refreshed.
//!
//! # Degraded mode
//!
//! The first storage error switches the cache into degraded mode: from
//! then on lookups miss and stores are dropped, and the scan carries on
//! extracting everything. The error itself is returned once so the caller
//! can report it.

use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash as _, Hasher as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::database::SqliteStore;
use super::entry::{entry_key, split_key, CacheEntry};
use super::store::{KvStore, MemoryStore};
use super::{CacheError, CacheResult};
use crate::scanner::{FileIdentity, Fingerprint};

const SHARDS: usize = 64;

/// Counters describing cache activity since the cache was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the store
    pub hits: u64,
    /// Lookups with no entry
    pub misses: u64,
    /// Entries found but invalidated by an identity change
    pub stale: u64,
    /// Entries that could not be decoded
    pub corrupt: u64,
    /// Successful writes
    pub writes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
    corrupt: AtomicU64,
    writes: AtomicU64,
}

/// Persistent mapping from file identity to fingerprint.
pub struct FingerprintCache {
    store: Option<Arc<dyn KvStore>>,
    degraded: AtomicBool,
    reason: Mutex<Option<String>>,
    shards: Vec<Mutex<()>>,
    counters: Counters,
}

impl std::fmt::Debug for FingerprintCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintCache")
            .field("degraded", &self.is_degraded())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl FingerprintCache {
    /// Wrap an existing store.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store: Some(store),
            degraded: AtomicBool::new(false),
            reason: Mutex::new(None),
            shards: (0..SHARDS).map(|_| Mutex::new(())).collect(),
            counters: Counters::default(),
        }
    }

    /// Open a persistent cache backed by SQLite at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &Path) -> CacheResult<Self> {
        Ok(Self::new(Arc::new(SqliteStore::open(path)?)))
    }

    /// A volatile cache that lives as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// A cache that never stores anything, already in degraded mode.
    ///
    /// Used when the persistent store could not be opened.
    #[must_use]
    pub fn disabled(reason: impl Into<String>) -> Self {
        let cache = Self::new(Arc::new(MemoryStore::new()));
        let reason = reason.into();
        log::warn!("Fingerprint cache disabled: {}", reason);
        cache.degraded.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = cache.reason.lock() {
            *slot = Some(reason);
        }
        Self { store: None, ..cache }
    }

    /// Whether storage failures have switched the cache off.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Description of the failure that degraded the cache.
    #[must_use]
    pub fn degraded_reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stale: self.counters.stale.load(Ordering::Relaxed),
            corrupt: self.counters.corrupt.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
        }
    }

    /// Look up the fingerprint of `identity` in `namespace`.
    ///
    /// Returns `Ok(None)` on a miss, for stale or corrupt entries (which
    /// are evicted) and whenever the cache is degraded.
    ///
    /// # Errors
    ///
    /// Returns the storage error that degraded the cache.
    pub fn lookup(
        &self,
        namespace: &str,
        identity: &FileIdentity,
    ) -> CacheResult<Option<Fingerprint>> {
        let Some(store) = self.active_store() else {
            return Ok(None);
        };
        let key = entry_key(namespace, &identity.path);

        let bytes = match store.get(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Err(e) => return Err(self.degrade(e)),
        };

        match CacheEntry::from_bytes(&bytes) {
            Ok(entry) if entry.is_valid_for(identity) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                log::trace!("Cache hit: {}", identity.path.display());
                Ok(Some(entry.fingerprint))
            }
            Ok(_) => {
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
                log::trace!("Stale cache entry: {}", identity.path.display());
                self.evict_if_unchanged(store, &key, &bytes)?;
                Ok(None)
            }
            Err(e) => {
                self.counters.corrupt.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "Corrupt cache entry for {}: {}",
                    identity.path.display(),
                    e
                );
                self.evict_if_unchanged(store, &key, &bytes)?;
                Ok(None)
            }
        }
    }

    /// Record `fingerprint` for `identity` in `namespace`.
    ///
    /// Does nothing when the cache is degraded.
    ///
    /// # Errors
    ///
    /// Returns the storage error that degraded the cache.
    pub fn store(
        &self,
        namespace: &str,
        identity: &FileIdentity,
        fingerprint: &Fingerprint,
    ) -> CacheResult<()> {
        let Some(store) = self.active_store() else {
            return Ok(());
        };
        let key = entry_key(namespace, &identity.path);
        let bytes = CacheEntry::new(identity, fingerprint.clone()).to_bytes()?;

        let _guard = self.shard(&key)?;
        match store.put(&key, &bytes) {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(self.degrade(e)),
        }
    }

    /// Remove the entry for `path` in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns the storage error that degraded the cache.
    pub fn evict(&self, namespace: &str, path: &Path) -> CacheResult<()> {
        let Some(store) = self.active_store() else {
            return Ok(());
        };
        let key = entry_key(namespace, path);
        let _guard = self.shard(&key)?;
        store.delete(&key).map_err(|e| self.degrade(e))
    }

    /// Remove entries, in every namespace, for paths not in `live`.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns the storage error that degraded the cache.
    pub fn prune(&self, live: &[FileIdentity]) -> CacheResult<usize> {
        let Some(store) = self.active_store() else {
            return Ok(0);
        };
        let live: HashSet<Cow<'_, str>> = live.iter().map(|id| id.path.to_string_lossy()).collect();
        let keys = store.keys("").map_err(|e| self.degrade(e))?;

        let mut removed = 0;
        for key in keys {
            let keep = split_key(&key)
                .and_then(|(_, path)| path.to_str())
                .is_some_and(|path| live.contains(path));
            if keep {
                continue;
            }
            let _guard = self.shard(&key)?;
            store.delete(&key).map_err(|e| self.degrade(e))?;
            removed += 1;
        }

        log::info!("Pruned {} cache entries", removed);
        Ok(removed)
    }

    /// Paths with an entry in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns the storage error that degraded the cache.
    pub fn paths(&self, namespace: &str) -> CacheResult<Vec<PathBuf>> {
        let Some(store) = self.active_store() else {
            return Ok(Vec::new());
        };
        let prefix = format!("{namespace}:");
        let keys = store.keys(&prefix).map_err(|e| self.degrade(e))?;
        Ok(keys
            .iter()
            .filter_map(|k| split_key(k).map(|(_, p)| p.to_path_buf()))
            .collect())
    }

    /// Total number of entries across namespaces.
    ///
    /// # Errors
    ///
    /// Returns the storage error that degraded the cache.
    pub fn len(&self) -> CacheResult<usize> {
        let Some(store) = self.active_store() else {
            return Ok(0);
        };
        store
            .keys("")
            .map(|keys| keys.len())
            .map_err(|e| self.degrade(e))
    }

    /// Whether the cache holds no entries.
    ///
    /// # Errors
    ///
    /// Returns the storage error that degraded the cache.
    pub fn is_empty(&self) -> CacheResult<bool> {
        self.len().map(|n| n == 0)
    }

    /// Remove every entry.
    ///
    /// # Errors
    ///
    /// Returns the storage error that degraded the cache.
    pub fn clear(&self) -> CacheResult<()> {
        let Some(store) = self.active_store() else {
            return Ok(());
        };
        store.clear().map_err(|e| self.degrade(e))
    }

    fn active_store(&self) -> Option<&dyn KvStore> {
        if self.is_degraded() {
            return None;
        }
        self.store.as_deref()
    }

    fn shard(&self, key: &str) -> CacheResult<std::sync::MutexGuard<'_, ()>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % SHARDS as u64) as usize;
        self.shards[index].lock().map_err(|_| CacheError::Poisoned)
    }

    fn evict_if_unchanged(&self, store: &dyn KvStore, key: &str, seen: &[u8]) -> CacheResult<()> {
        let _guard = self.shard(key)?;
        match store.get(key) {
            Ok(Some(current)) if current == seen => {
                store.delete(key).map_err(|e| self.degrade(e))
            }
            Ok(_) => Ok(()),
            Err(e) => Err(self.degrade(e)),
        }
    }

    fn degrade(&self, error: CacheError) -> CacheError {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            log::warn!(
                "Fingerprint cache unavailable, continuing without it: {}",
                error
            );
            if let Ok(mut slot) = self.reason.lock() {
                *slot = Some(error.to_string());
            }
        }
        error
    }
}
