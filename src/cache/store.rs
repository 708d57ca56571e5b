//! Key-value storage contract.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{CacheError, CacheResult};

/// Byte-oriented key-value store backing the fingerprint cache.
///
/// Implementations must be safe to call from many threads at once. Each
/// single operation must be atomic: a reader never observes a partially
/// written value.
pub trait KvStore: Send + Sync {
    /// Fetch the value stored under `key`.
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> CacheResult<()>;

    /// Remove `key` if present.
    fn delete(&self, key: &str) -> CacheResult<()>;

    /// All keys starting with `prefix`, in ascending order.
    fn keys(&self, prefix: &str) -> CacheResult<Vec<String>>;

    /// Remove every key.
    fn clear(&self) -> CacheResult<()>;
}

/// Volatile store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CacheResult<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries.lock().map_err(|_| CacheError::Poisoned)
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .lock()?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn clear(&self) -> CacheResult<()> {
        self.lock()?.clear();
        Ok(())
    }
}
