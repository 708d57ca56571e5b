//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//! The [`Hasher`] reads files in fixed-size blocks so memory use stays
//! bounded by the block size regardless of file size. A shutdown flag is
//! checked between blocks so a cancelled scan does not finish hashing a
//! multi-gigabyte file first.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::fingerprint::Fingerprint;
use super::ExtractionError;

/// A 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Default read block size (64 KiB).
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Streaming BLAKE3 hasher for exact-mode fingerprints.
#[derive(Debug, Clone)]
pub struct Hasher {
    block_size: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a hasher with the default block size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            shutdown_flag: None,
        }
    }

    /// Use a different read block size (minimum 1 KiB).
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1024);
        self
    }

    /// Stop reading as soon as the flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Configured block size in bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Hash the full content of a file.
    ///
    /// # Errors
    ///
    /// Returns the mapped I/O error if the file cannot be opened or read,
    /// or [`ExtractionError::Interrupted`] if shutdown was requested.
    pub fn full_hash(&self, path: &Path) -> Result<Hash, ExtractionError> {
        let mut file = File::open(path).map_err(|e| ExtractionError::from_io(path, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.block_size];

        loop {
            if self.is_shutdown_requested() {
                return Err(ExtractionError::Interrupted(path.to_path_buf()));
            }
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ExtractionError::from_io(path, e)),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(*hasher.finalize().as_bytes())
    }

    /// Hash an in-memory buffer.
    #[must_use]
    pub fn hash_bytes(&self, data: &[u8]) -> Hash {
        *blake3::hash(data).as_bytes()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Extract for Hasher {
    fn namespace(&self) -> String {
        "exact".to_string()
    }

    fn extract_path(&self, path: &Path) -> Result<Fingerprint, ExtractionError> {
        self.full_hash(path).map(Fingerprint::Exact)
    }
}

/// Format a hash as lowercase hexadecimal.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}

/// Parse a 64-character hexadecimal string back into a hash.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Hash> {
    blake3::Hash::from_hex(hex).ok().map(|h| *h.as_bytes())
}
