//! Directory walker producing scan items.
//!
//! # Overview
//!
//! The engine itself never walks directories; it is handed a list of
//! [`FileIdentity`] values. This module is the reference collaborator that
//! produces such a list, using [`jwalk`] for parallel traversal and the
//! `ignore` crate for gitignore-style exclusion patterns.
//!
//! # Features
//!
//! - Parallel traversal with deterministic per-directory ordering
//! - Optional symlink following
//! - Gitignore-style patterns plus the root's own `.gitignore`
//! - Size and extension filters
//! - Each file reported once, however many hardlinks, followed symlinks
//!   or roots reach it
//! - Graceful shutdown via atomic flag
//!
//! # Example
//!
//! ```no_run
//! use dupengine::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig::default().with_extensions(vec!["png".into()]);
//! let walker = Walker::new(Path::new("/home/user/Pictures"), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::borrow::BorrowMut;
use std::collections::HashSet;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::{FileIdentity, ItemKey};

/// Errors reported while walking. None of them stops the walk.
#[derive(thiserror::Error, Debug)]
pub enum WalkError {
    /// A directory or file could not be accessed.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An entry vanished between listing and inspection.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Any other I/O failure.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl WalkError {
    fn from_io(path: &Path, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied(path) | Self::NotFound(path) | Self::Io { path, .. } => path,
        }
    }
}

/// Options controlling which files the walker reports.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links to files and directories.
    pub follow_symlinks: bool,
    /// Skip entries whose name starts with a dot.
    pub skip_hidden: bool,
    /// Minimum file size in bytes.
    pub min_size: Option<u64>,
    /// Maximum file size in bytes.
    pub max_size: Option<u64>,
    /// Gitignore-style patterns to exclude.
    pub ignore_patterns: Vec<String>,
    /// Lowercase extensions to keep; empty keeps everything.
    pub extensions: Vec<String>,
}

impl WalkerConfig {
    /// Set the symlink-following behaviour.
    #[must_use]
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set whether hidden entries are skipped.
    #[must_use]
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Set the minimum file size.
    #[must_use]
    pub fn with_min_size(mut self, size: Option<u64>) -> Self {
        self.min_size = size;
        self
    }

    /// Set the maximum file size.
    #[must_use]
    pub fn with_max_size(mut self, size: Option<u64>) -> Self {
        self.max_size = size;
        self
    }

    /// Set the ignore patterns.
    #[must_use]
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Restrict the walk to the given extensions (case-insensitive,
    /// without leading dot).
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    fn passes_size_filter(&self, size: u64) -> bool {
        self.min_size.is_none_or(|min| size >= min) && self.max_size.is_none_or(|max| size <= max)
    }

    fn passes_extension_filter(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

/// Directory walker for one root.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a walker for `path`.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Stop iteration as soon as the flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn build_gitignore(&self) -> Option<Gitignore> {
        let mut builder = GitignoreBuilder::new(&self.root);

        let gitignore_path = self.root.join(".gitignore");
        if gitignore_path.exists() {
            if let Some(e) = builder.add(&gitignore_path) {
                log::warn!(
                    "Failed to load .gitignore from {}: {}",
                    gitignore_path.display(),
                    e
                );
            } else {
                log::debug!("Loaded .gitignore from {}", gitignore_path.display());
            }
        }

        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if !gitignore.is_empty() => Some(gitignore),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    fn is_ignored(&self, path: &Path, is_dir: bool, gitignore: Option<&Gitignore>) -> bool {
        let Some(gi) = gitignore else {
            return false;
        };
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        gi.matched_path_or_any_parents(relative, is_dir).is_ignore()
    }

    /// Walk the tree, yielding identities of regular files.
    ///
    /// Errors are yielded inline; iteration continues past them. A root
    /// that is itself a regular file yields just that file.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileIdentity, WalkError>> + '_ {
        self.walk_tracked(LinkTracker::default())
    }

    /// Walk the tree, skipping files already recorded in `links`.
    ///
    /// Sharing one tracker across walkers reports a file reachable from
    /// several roots once.
    pub fn walk_with<'a>(
        &'a self,
        links: &'a mut LinkTracker,
    ) -> impl Iterator<Item = Result<FileIdentity, WalkError>> + 'a {
        self.walk_tracked(links)
    }

    fn walk_tracked<'a, L>(
        &'a self,
        mut links: L,
    ) -> impl Iterator<Item = Result<FileIdentity, WalkError>> + 'a
    where
        L: BorrowMut<LinkTracker> + 'a,
    {
        let gitignore = self.build_gitignore();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(|_depth, _path, _state, children| {
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: shutdown requested, stopping iteration");
                return None;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map_or_else(|| self.root.clone(), Path::to_path_buf);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    let error = match e.into_io_error() {
                        Some(io) => WalkError::from_io(&path, io),
                        None => WalkError::Io {
                            path,
                            source: std::io::Error::other("directory loop detected"),
                        },
                    };
                    return Some(Err(error));
                }
            };

            let path = entry.path();
            let file_type = entry.file_type();
            if file_type.is_dir() {
                return None;
            }
            if self.is_ignored(&path, false, gitignore.as_ref()) {
                log::trace!("Ignoring file: {}", path.display());
                return None;
            }
            if file_type.is_symlink() && !self.config.follow_symlinks {
                log::trace!("Skipping symlink: {}", path.display());
                return None;
            }

            let metadata = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Cannot stat {}: {}", path.display(), e);
                    return Some(Err(WalkError::from_io(&path, e)));
                }
            };
            if !metadata.is_file() {
                return None;
            }

            self.accept(path, &metadata, links.borrow_mut()).map(Ok)
        })
    }

    fn accept(
        &self,
        path: PathBuf,
        metadata: &Metadata,
        links: &mut LinkTracker,
    ) -> Option<FileIdentity> {
        if !self.config.passes_size_filter(metadata.len()) {
            log::trace!("Skipping file due to size filter: {}", path.display());
            return None;
        }
        if !self.config.passes_extension_filter(&path) {
            log::trace!("Skipping file due to extension filter: {}", path.display());
            return None;
        }
        if links.seen_before(&path, metadata, self.config.follow_symlinks) {
            log::debug!("Skipping second link to a reported file: {}", path.display());
            return None;
        }
        Some(FileIdentity::from_metadata(path, metadata))
    }
}

/// Walk several roots and merge the results.
///
/// Files reachable from more than one root (nested or repeated roots, or
/// hardlinks and symlinks crossing roots) are reported once. The result is
/// sorted by path.
pub fn walk_all(
    roots: &[PathBuf],
    config: &WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
) -> (Vec<FileIdentity>, Vec<WalkError>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    let mut links = LinkTracker::default();

    for root in roots {
        let mut walker = Walker::new(root, config.clone());
        if let Some(flag) = &shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }
        for entry in walker.walk_with(&mut links) {
            match entry {
                Ok(file) => files.push(file),
                Err(e) => errors.push(e),
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
    log::info!(
        "Walked {} root(s): {} files, {} errors",
        roots.len(),
        files.len(),
        errors.len()
    );
    (files, errors)
}

/// Remembers the underlying files already reported.
///
/// Files with a single link are only recorded when symlinks are followed,
/// since otherwise no second path can reach them.
#[derive(Debug, Default)]
pub struct LinkTracker {
    seen: HashSet<ItemKey>,
}

impl LinkTracker {
    fn seen_before(&mut self, path: &Path, metadata: &Metadata, follow_symlinks: bool) -> bool {
        if !follow_symlinks && !has_other_links(metadata) {
            return false;
        }
        ItemKey::from_metadata(path, metadata).is_some_and(|key| !self.seen.insert(key))
    }
}

#[cfg(unix)]
fn has_other_links(metadata: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink() > 1
}

#[cfg(not(unix))]
fn has_other_links(_metadata: &Metadata) -> bool {
    false
}
