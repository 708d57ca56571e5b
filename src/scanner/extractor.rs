//! Mode dispatch for fingerprint extraction.
//!
//! [`FingerprintExtractor`] picks the concrete extractor for a
//! [`ScanMode`] and adds the behaviour shared by all of them: rejecting
//! empty files, honouring the shutdown flag and enforcing an optional
//! per-file time budget.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::audio::{AudioExtractor, DEFAULT_SEGMENTS};
use super::fingerprint::Fingerprint;
use super::hasher::Hasher;
use super::perceptual::{PictureExtractor, DEFAULT_GRID_SIZE};
use super::{ExtractionError, FileIdentity, ScanMode};

/// A single fingerprinting algorithm.
pub trait Extract: Send + Sync {
    /// Cache namespace for fingerprints produced by this extractor.
    ///
    /// Fingerprints are only reused when the namespace matches, so any
    /// parameter that changes the output must be part of it.
    fn namespace(&self) -> String;

    /// Compute the fingerprint of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractionError`] describing why the file could not be
    /// fingerprinted.
    fn extract_path(&self, path: &Path) -> Result<Fingerprint, ExtractionError>;
}

/// Fingerprint extractor for one scan mode.
#[derive(Debug, Clone)]
pub enum FingerprintExtractor {
    /// Full-content BLAKE3 hash.
    Exact(Hasher),
    /// Luminance block grid.
    Picture(PictureExtractor),
    /// Amplitude envelope.
    Audio(AudioExtractor),
}

impl FingerprintExtractor {
    /// Create an extractor for `mode` with default parameters.
    #[must_use]
    pub fn new(mode: ScanMode) -> Self {
        Self::with_params(mode, DEFAULT_GRID_SIZE, DEFAULT_SEGMENTS)
    }

    /// Create an extractor with explicit grid size and segment count.
    ///
    /// Parameters irrelevant to `mode` are ignored.
    #[must_use]
    pub fn with_params(mode: ScanMode, grid_size: u32, audio_segments: u32) -> Self {
        match mode {
            ScanMode::Exact => Self::Exact(Hasher::new()),
            ScanMode::Picture => Self::Picture(PictureExtractor::new(grid_size)),
            ScanMode::Audio => Self::Audio(AudioExtractor::new(audio_segments)),
        }
    }

    /// Let the exact hasher stop between blocks when `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(self, flag: Arc<AtomicBool>) -> Self {
        match self {
            Self::Exact(hasher) => Self::Exact(hasher.with_shutdown_flag(flag)),
            other => other,
        }
    }

    /// Mode of the fingerprints this extractor produces.
    #[must_use]
    pub fn mode(&self) -> ScanMode {
        match self {
            Self::Exact(_) => ScanMode::Exact,
            Self::Picture(_) => ScanMode::Picture,
            Self::Audio(_) => ScanMode::Audio,
        }
    }

    fn inner(&self) -> &dyn Extract {
        match self {
            Self::Exact(hasher) => hasher,
            Self::Picture(picture) => picture,
            Self::Audio(audio) => audio,
        }
    }

    /// Cache namespace, e.g. `exact`, `picture/16` or `audio/64`.
    #[must_use]
    pub fn namespace(&self) -> String {
        self.inner().namespace()
    }

    /// Fingerprint one file.
    ///
    /// The identity is trusted as given; a file that changed since it was
    /// statted is read in its current state.
    ///
    /// # Errors
    ///
    /// [`ExtractionError::Empty`] for zero-length files, otherwise
    /// whatever the mode's extractor reports.
    pub fn extract(&self, identity: &FileIdentity) -> Result<Fingerprint, ExtractionError> {
        if identity.size == 0 {
            return Err(ExtractionError::Empty(identity.path.clone()));
        }
        self.inner().extract_path(&identity.path)
    }

    /// Fingerprint one file, giving up after `budget`.
    ///
    /// The extraction runs on a helper thread. When the budget expires the
    /// helper is abandoned and finishes in the background; its result is
    /// discarded.
    ///
    /// # Errors
    ///
    /// [`ExtractionError::TimedOut`] if the budget expires, otherwise the
    /// same errors as [`extract`](Self::extract).
    pub fn extract_with_budget(
        &self,
        identity: &FileIdentity,
        budget: Duration,
    ) -> Result<Fingerprint, ExtractionError> {
        if identity.size == 0 {
            return Err(ExtractionError::Empty(identity.path.clone()));
        }

        let (tx, rx) = mpsc::channel();
        let extractor = self.clone();
        let task_identity = identity.clone();
        let spawned = thread::Builder::new()
            .name("dupengine-extract".to_string())
            .spawn(move || {
                // The receiver may already be gone after a timeout.
                let _ = tx.send(extractor.extract(&task_identity));
            });

        if let Err(e) = spawned {
            log::warn!(
                "Could not spawn extraction thread for {}: {}; extracting inline",
                identity.path.display(),
                e
            );
            return self.extract(identity);
        }

        match rx.recv_timeout(budget) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Extraction of {} exceeded {:?}",
                    identity.path.display(),
                    budget
                );
                Err(ExtractionError::TimedOut {
                    path: identity.path.clone(),
                    budget,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExtractionError::Decode {
                path: identity.path.clone(),
                reason: "extractor terminated unexpectedly".to_string(),
            }),
        }
    }
}

/// Whether an optional shutdown flag has been raised.
pub(crate) fn flag_raised(flag: Option<&Arc<AtomicBool>>) -> bool {
    flag.is_some_and(|f| f.load(Ordering::SeqCst))
}
