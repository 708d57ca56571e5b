//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Matching fingerprints into edges (exact and fuzzy)
//! - Ranking items with an ordered list of criteria
//! - Building duplicate groups from match edges
//! - Orchestrating a whole scan ([`Engine`])

pub mod finder;
pub mod groups;
pub mod matcher;
pub mod priority;

pub use finder::{Engine, EngineError, FileError, ScanResult, ScanStats, ScanWarning};
pub use groups::{build_groups, BuiltGroups, DupeGroup, GroupMember, UnionFind};
pub use matcher::{DistanceStrategy, MatchEdge, Matcher, MeanAbsoluteDistance};
pub use priority::{
    AgePreference, CompareFn, ContainsPreference, Criterion, CustomOrder, LengthPreference,
    ParseCriterionError, PriorityRule, Ranking, SizePreference,
};
