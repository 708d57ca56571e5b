//! Duplicate group construction.
//!
//! # Overview
//!
//! Items are vertices addressed by their index in the scan's item list;
//! [`MatchEdge`]s are the edges. A disjoint-set forest ([`UnionFind`])
//! merges the endpoints of every edge, and each resulting component with
//! at least two items becomes a [`DupeGroup`]. The reference item of each
//! group is chosen with a [`PriorityRule`].
//!
//! # Example
//!
//! ```
//! use dupengine::duplicates::{build_groups, MatchEdge, PriorityRule};
//! use dupengine::scanner::{FileIdentity, ScanMode};
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let now = SystemTime::now();
//! let items = vec![
//!     FileIdentity::new(PathBuf::from("/a"), 10, now),
//!     FileIdentity::new(PathBuf::from("/b"), 10, now),
//!     FileIdentity::new(PathBuf::from("/c"), 10, now),
//! ];
//! let edges = vec![MatchEdge::new(0, 1, 1.0)];
//!
//! let built = build_groups(&items, &edges, &PriorityRule::default(), ScanMode::Exact);
//! assert_eq!(built.groups.len(), 1);
//! assert_eq!(built.groups[0].reference().path, PathBuf::from("/a"));
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::matcher::MatchEdge;
use super::priority::PriorityRule;
use crate::scanner::{FileIdentity, ScanMode};

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// Create `n` singleton sets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Whether the forest has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Representative of the set containing `x`.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Merge the sets containing `x` and `y`. Returns `false` if they were
    /// already joined.
    pub fn union(&mut self, x: usize, y: usize) -> bool {
        let (rx, ry) = (self.find(x), self.find(y));
        if rx == ry {
            return false;
        }
        match self.rank[rx].cmp(&self.rank[ry]) {
            Ordering::Less => self.parent[rx] = ry,
            Ordering::Greater => self.parent[ry] = rx,
            Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] = self.rank[rx].saturating_add(1);
            }
        }
        true
    }
}

/// One item of a duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    /// The item
    pub identity: FileIdentity,
    /// Best score of any match edge touching this item
    pub score: f64,
}

/// A set of mutually matching items with a designated reference.
///
/// `members[0]` is the reference; the rest follow in path order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DupeGroup {
    /// Mode that produced the group
    pub mode: ScanMode,
    /// Reference first, then the other members by path
    pub members: Vec<GroupMember>,
}

impl DupeGroup {
    /// The item to keep.
    #[must_use]
    pub fn reference(&self) -> &FileIdentity {
        &self.members[0].identity
    }

    /// Members other than the reference.
    #[must_use]
    pub fn duplicates(&self) -> &[GroupMember] {
        &self.members[1..]
    }

    /// Number of members, reference included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false; groups have at least two members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Combined size of all members.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.members.iter().map(|m| m.identity.size).sum()
    }

    /// Bytes freed if every non-reference member were removed.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.duplicates().iter().map(|m| m.identity.size).sum()
    }

    /// Member paths in listing order.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        self.members.iter().map(|m| m.identity.path.as_path()).collect()
    }

    /// Whether `path` is a member.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.members.iter().any(|m| m.identity.path == path)
    }
}

/// Groups plus bookkeeping from [`build_groups`].
#[derive(Debug, Clone, Default)]
pub struct BuiltGroups {
    /// Groups ordered by reference path
    pub groups: Vec<DupeGroup>,
    /// Reference paths of groups whose ranking fell back to path order
    pub fallback_groups: Vec<PathBuf>,
}

/// Build duplicate groups from match edges.
///
/// Edges must index into `items`; out-of-range edges are ignored.
/// Components of a single item are discarded.
#[must_use]
pub fn build_groups(
    items: &[FileIdentity],
    edges: &[MatchEdge],
    rule: &PriorityRule,
    mode: ScanMode,
) -> BuiltGroups {
    let mut forest = UnionFind::new(items.len());
    let mut best_score = vec![0.0f64; items.len()];

    for edge in edges {
        if edge.a >= items.len() || edge.b >= items.len() || edge.a == edge.b {
            log::debug!("Ignoring invalid edge ({}, {})", edge.a, edge.b);
            continue;
        }
        forest.union(edge.a, edge.b);
        best_score[edge.a] = best_score[edge.a].max(edge.score);
        best_score[edge.b] = best_score[edge.b].max(edge.score);
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for index in 0..items.len() {
        let root = forest.find(index);
        components.entry(root).or_default().push(index);
    }

    let mut built = BuiltGroups::default();
    for mut indices in components.into_values().filter(|c| c.len() > 1) {
        indices.sort_by(|&x, &y| items[x].path.cmp(&items[y].path));

        let (reference, fell_back) = select_reference(items, &indices, rule);
        let reference_index = indices.remove(reference);
        indices.insert(0, reference_index);

        let members: Vec<GroupMember> = indices
            .iter()
            .map(|&i| GroupMember {
                identity: items[i].clone(),
                score: best_score[i],
            })
            .collect();
        let group = DupeGroup { mode, members };

        if fell_back {
            log::warn!(
                "Priority rule could not rank group of {}; using path order",
                group.reference().path.display()
            );
            built.fallback_groups.push(group.reference().path.clone());
        }
        log::debug!(
            "Group of {} items, reference {}",
            group.len(),
            group.reference().path.display()
        );
        built.groups.push(group);
    }

    built
        .groups
        .sort_by(|x, y| x.reference().path.cmp(&y.reference().path));
    built.fallback_groups.sort();
    built
}

/// Position in `indices` of the preferred item, and whether any comparison
/// fell back to path order.
///
/// `indices` must be in path order; a linear scan keeps the result well
/// defined even for rules that are not a strict total order.
fn select_reference(items: &[FileIdentity], indices: &[usize], rule: &PriorityRule) -> (usize, bool) {
    let mut best = 0;
    let mut fell_back = false;
    for position in 1..indices.len() {
        let ranking = rule.compare(&items[indices[position]], &items[indices[best]]);
        fell_back |= ranking.fell_back;
        if ranking.ordering == Ordering::Less {
            best = position;
        }
    }
    (best, fell_back)
}
