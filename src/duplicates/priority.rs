//! Reference selection rules.
//!
//! A [`PriorityRule`] is an ordered list of [`Criterion`]s. Earlier
//! criteria dominate; later ones only break ties. When every criterion
//! ties, items are ordered by path so the outcome never depends on input
//! order.
//!
//! Rules can be written as strings on the command line:
//!
//! | String | Criterion |
//! |--------|-----------|
//! | `largest` / `smallest` | [`Criterion::Size`] |
//! | `newest` / `oldest` | [`Criterion::Modified`] |
//! | `shortest-path` / `longest-path` | [`Criterion::PathLength`] |
//! | `folder=/keep,/also-keep` | [`Criterion::Folder`] |
//! | `ext=flac,wav` | [`Criterion::Extension`] |
//! | `name-contains=orig` / `name-lacks=copy` | [`Criterion::FilenameContains`] |
//!
//! # Example
//!
//! ```
//! use dupengine::duplicates::PriorityRule;
//!
//! let rule: PriorityRule = "folder=/photos/master,largest,oldest".parse().unwrap();
//! assert_eq!(rule.criteria().len(), 3);
//! ```

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::scanner::FileIdentity;

/// Preferred end of the size scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizePreference {
    /// Keep the biggest file
    Largest,
    /// Keep the smallest file
    Smallest,
}

/// Preferred end of the modification-time scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgePreference {
    /// Keep the most recently modified file
    Newest,
    /// Keep the least recently modified file
    Oldest,
}

/// Preferred end of the path-length scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPreference {
    /// Keep the file with the shortest path
    Shortest,
    /// Keep the file with the longest path
    Longest,
}

/// Whether a filename match is wanted or unwanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainsPreference {
    /// Prefer names containing the text
    Containing,
    /// Prefer names not containing the text
    NotContaining,
}

/// Comparison function for [`Criterion::Custom`].
///
/// Returns `Some(Ordering::Less)` when the first item should be preferred
/// and `None` when the two items cannot be ordered.
pub type CompareFn = dyn Fn(&FileIdentity, &FileIdentity) -> Option<Ordering> + Send + Sync;

/// Caller-supplied ordering.
#[derive(Clone)]
pub struct CustomOrder {
    name: String,
    compare: Arc<CompareFn>,
}

impl CustomOrder {
    /// Wrap a comparison function under a display name.
    pub fn new<F>(name: impl Into<String>, compare: F) -> Self
    where
        F: Fn(&FileIdentity, &FileIdentity) -> Option<Ordering> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            compare: Arc::new(compare),
        }
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for CustomOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CustomOrder").field(&self.name).finish()
    }
}

impl PartialEq for CustomOrder {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.compare, &other.compare)
    }
}

/// One ranking criterion. `Ordering::Less` means the first item wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "criterion", rename_all = "snake_case")]
pub enum Criterion {
    /// Rank by file size.
    Size {
        /// Which end wins
        prefer: SizePreference,
    },
    /// Rank by modification time.
    Modified {
        /// Which end wins
        prefer: AgePreference,
    },
    /// Rank by length of the full path.
    PathLength {
        /// Which end wins
        prefer: LengthPreference,
    },
    /// Items under an earlier-listed folder win; unlisted items rank last.
    Folder {
        /// Folders in decreasing priority
        folders: Vec<PathBuf>,
    },
    /// Items with an earlier-listed extension win; others rank last.
    Extension {
        /// Lowercase extensions without dot, in decreasing priority
        extensions: Vec<String>,
    },
    /// Rank by whether the file name contains some text (case-insensitive).
    FilenameContains {
        /// Text to look for
        text: String,
        /// Whether containing it is good or bad
        prefer: ContainsPreference,
    },
    /// Programmatic ordering; cannot be stored in configuration.
    #[serde(skip)]
    Custom(CustomOrder),
}

impl Criterion {
    /// Compare two items. `None` means this criterion cannot order them.
    #[must_use]
    pub fn compare(&self, a: &FileIdentity, b: &FileIdentity) -> Option<Ordering> {
        match self {
            Self::Size { prefer } => Some(match prefer {
                SizePreference::Largest => b.size.cmp(&a.size),
                SizePreference::Smallest => a.size.cmp(&b.size),
            }),
            Self::Modified { prefer } => Some(match prefer {
                AgePreference::Newest => b.modified.cmp(&a.modified),
                AgePreference::Oldest => a.modified.cmp(&b.modified),
            }),
            Self::PathLength { prefer } => {
                let (la, lb) = (a.path.as_os_str().len(), b.path.as_os_str().len());
                Some(match prefer {
                    LengthPreference::Shortest => la.cmp(&lb),
                    LengthPreference::Longest => lb.cmp(&la),
                })
            }
            Self::Folder { folders } => {
                let rank = |path: &Path| {
                    folders
                        .iter()
                        .position(|folder| path.starts_with(folder))
                        .unwrap_or(folders.len())
                };
                Some(rank(&a.path).cmp(&rank(&b.path)))
            }
            Self::Extension { extensions } => {
                let rank = |identity: &FileIdentity| {
                    identity
                        .extension()
                        .and_then(|ext| extensions.iter().position(|e| e.eq_ignore_ascii_case(&ext)))
                        .unwrap_or(extensions.len())
                };
                Some(rank(a).cmp(&rank(b)))
            }
            Self::FilenameContains { text, prefer } => {
                let needle = text.to_lowercase();
                let contains = |path: &Path| {
                    path.file_name()
                        .is_some_and(|n| n.to_string_lossy().to_lowercase().contains(&needle))
                };
                let (ca, cb) = (contains(&a.path), contains(&b.path));
                Some(match prefer {
                    ContainsPreference::Containing => cb.cmp(&ca),
                    ContainsPreference::NotContaining => ca.cmp(&cb),
                })
            }
            Self::Custom(custom) => (custom.compare)(a, b),
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Size { prefer: SizePreference::Largest } => write!(f, "largest"),
            Self::Size { prefer: SizePreference::Smallest } => write!(f, "smallest"),
            Self::Modified { prefer: AgePreference::Newest } => write!(f, "newest"),
            Self::Modified { prefer: AgePreference::Oldest } => write!(f, "oldest"),
            Self::PathLength { prefer: LengthPreference::Shortest } => write!(f, "shortest-path"),
            Self::PathLength { prefer: LengthPreference::Longest } => write!(f, "longest-path"),
            Self::Folder { folders } => {
                let list: Vec<_> = folders.iter().map(|p| p.display().to_string()).collect();
                write!(f, "folder={}", list.join(","))
            }
            Self::Extension { extensions } => write!(f, "ext={}", extensions.join(",")),
            Self::FilenameContains { text, prefer: ContainsPreference::Containing } => {
                write!(f, "name-contains={text}")
            }
            Self::FilenameContains { text, prefer: ContainsPreference::NotContaining } => {
                write!(f, "name-lacks={text}")
            }
            Self::Custom(custom) => write!(f, "custom({})", custom.name()),
        }
    }
}

/// Error parsing a criterion string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid priority criterion '{input}': {reason}")]
pub struct ParseCriterionError {
    /// The rejected text
    pub input: String,
    /// What was wrong with it
    pub reason: String,
}

impl FromStr for Criterion {
    type Err = ParseCriterionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| ParseCriterionError {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        let s = s.trim();
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (s, None),
        };
        let list = |value: Option<&str>| -> Result<Vec<String>, ParseCriterionError> {
            let items: Vec<String> = value
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            if items.is_empty() {
                Err(err("expected a comma-separated list after '='"))
            } else {
                Ok(items)
            }
        };
        let text = |value: Option<&str>| match value {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(err("expected text after '='")),
        };

        match name.to_ascii_lowercase().as_str() {
            "largest" => Ok(Self::Size { prefer: SizePreference::Largest }),
            "smallest" => Ok(Self::Size { prefer: SizePreference::Smallest }),
            "newest" => Ok(Self::Modified { prefer: AgePreference::Newest }),
            "oldest" => Ok(Self::Modified { prefer: AgePreference::Oldest }),
            "shortest-path" => Ok(Self::PathLength { prefer: LengthPreference::Shortest }),
            "longest-path" => Ok(Self::PathLength { prefer: LengthPreference::Longest }),
            "folder" => Ok(Self::Folder {
                folders: list(value)?.into_iter().map(PathBuf::from).collect(),
            }),
            "ext" => Ok(Self::Extension {
                extensions: list(value)?
                    .into_iter()
                    .map(|e| e.trim_start_matches('.').to_lowercase())
                    .collect(),
            }),
            "name-contains" => Ok(Self::FilenameContains {
                text: text(value)?,
                prefer: ContainsPreference::Containing,
            }),
            "name-lacks" => Ok(Self::FilenameContains {
                text: text(value)?,
                prefer: ContainsPreference::NotContaining,
            }),
            _ => Err(err("unknown criterion")),
        }
    }
}

/// Outcome of comparing two items under a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranking {
    /// `Less` if the first item is preferred
    pub ordering: Ordering,
    /// Whether a criterion failed and path order decided instead
    pub fell_back: bool,
}

/// Ordered list of criteria for choosing a group's reference item.
///
/// An empty rule orders purely by path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityRule(Vec<Criterion>);

impl PriorityRule {
    /// Build a rule from criteria in decreasing importance.
    #[must_use]
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self(criteria)
    }

    /// Append a lower-priority criterion.
    #[must_use]
    pub fn then(mut self, criterion: Criterion) -> Self {
        self.0.push(criterion);
        self
    }

    /// The criteria in decreasing importance.
    #[must_use]
    pub fn criteria(&self) -> &[Criterion] {
        &self.0
    }

    /// Whether the rule has no criteria.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compare two items.
    ///
    /// Criteria are applied in order until one is decisive. If a criterion
    /// cannot order the pair, path order decides and the ranking is marked
    /// as a fallback. Full ties are also broken by path.
    #[must_use]
    pub fn compare(&self, a: &FileIdentity, b: &FileIdentity) -> Ranking {
        for criterion in &self.0 {
            match criterion.compare(a, b) {
                Some(Ordering::Equal) => continue,
                Some(ordering) => {
                    return Ranking {
                        ordering,
                        fell_back: false,
                    }
                }
                None => {
                    return Ranking {
                        ordering: a.path.cmp(&b.path),
                        fell_back: true,
                    }
                }
            }
        }
        Ranking {
            ordering: a.path.cmp(&b.path),
            fell_back: false,
        }
    }
}

impl FromStr for PriorityRule {
    type Err = ParseCriterionError;

    /// Parse a comma-separated list of simple criteria.
    ///
    /// List-valued criteria (`folder=`, `ext=`) consume the remaining
    /// comma-separated values up to the next recognised criterion name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut criteria = Vec::new();
        let mut pending: Option<String> = None;

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let starts_new = part.contains('=') || part.parse::<Criterion>().is_ok();
            match (&mut pending, starts_new) {
                (Some(current), false) => {
                    current.push(',');
                    current.push_str(part);
                }
                _ => {
                    if let Some(done) = pending.take() {
                        criteria.push(done.parse()?);
                    }
                    pending = Some(part.to_string());
                }
            }
        }
        if let Some(done) = pending {
            criteria.push(done.parse()?);
        }
        Ok(Self(criteria))
    }
}

impl From<Vec<Criterion>> for PriorityRule {
    fn from(criteria: Vec<Criterion>) -> Self {
        Self(criteria)
    }
}
