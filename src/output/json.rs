//! JSON output for scan results.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "groups": [
//!     {
//!       "mode": "picture",
//!       "reference": "/photos/a.png",
//!       "total_size": 4096,
//!       "reclaimable_bytes": 2048,
//!       "members": [
//!         {"path": "/photos/a.png", "size": 2048,
//!          "modified": "2023-11-14T22:13:20+00:00",
//!          "score": 0.98, "reference": true}
//!       ]
//!     }
//!   ],
//!   "errors": [{"path": "/photos/broken.png", "kind": "decode", "message": "..."}],
//!   "walk_errors": ["Permission denied: /root"],
//!   "warnings": [{"warning": "empty_files_skipped", "count": 1}],
//!   "summary": {"total_items": 3, "duplicate_groups": 1, "duration_ms": 12,
//!               "exit_code": 3, "exit_code_name": "DE003"}
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use super::format_modified;
use crate::duplicates::{DupeGroup, FileError, ScanResult, ScanStats, ScanWarning};
use crate::error::ExitCode;
use crate::scanner::{ScanMode, WalkError};

/// One group member.
#[derive(Debug, Clone, Serialize)]
pub struct JsonMember {
    /// Path of the file
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time (RFC 3339)
    pub modified: String,
    /// Best match score
    pub score: f64,
    /// Whether this is the file to keep
    pub reference: bool,
}

/// One duplicate group.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    /// Mode that produced the group
    pub mode: ScanMode,
    /// Path of the reference member
    pub reference: String,
    /// Combined size of all members
    pub total_size: u64,
    /// Size of the non-reference members
    pub reclaimable_bytes: u64,
    /// Reference first, then by path
    pub members: Vec<JsonMember>,
}

impl JsonGroup {
    /// Convert a [`DupeGroup`].
    #[must_use]
    pub fn from_group(group: &DupeGroup) -> Self {
        Self {
            mode: group.mode,
            reference: group.reference().path.to_string_lossy().into_owned(),
            total_size: group.total_size(),
            reclaimable_bytes: group.reclaimable_bytes(),
            members: group
                .members
                .iter()
                .enumerate()
                .map(|(position, member)| JsonMember {
                    path: member.identity.path.to_string_lossy().into_owned(),
                    size: member.identity.size,
                    modified: format_modified(member.identity.modified),
                    score: member.score,
                    reference: position == 0,
                })
                .collect(),
        }
    }
}

/// Summary statistics plus the exit code.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Scan counters
    #[serde(flatten)]
    pub stats: ScanStats,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DE000")
    pub exit_code_name: String,
}

/// Complete JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Duplicate groups
    pub groups: Vec<JsonGroup>,
    /// Files that could not be fingerprinted
    pub errors: Vec<FileError>,
    /// Traversal failures
    pub walk_errors: Vec<String>,
    /// Non-fatal conditions
    pub warnings: Vec<ScanWarning>,
    /// Counters
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Build the document for `result`.
    ///
    /// ```
    /// use dupengine::duplicates::ScanResult;
    /// use dupengine::error::ExitCode;
    /// use dupengine::output::JsonOutput;
    ///
    /// let output = JsonOutput::new(&ScanResult::default(), ExitCode::NoDuplicates);
    /// assert!(output.groups.is_empty());
    /// assert_eq!(output.summary.exit_code, 2);
    /// ```
    #[must_use]
    pub fn new(result: &ScanResult, exit_code: ExitCode) -> Self {
        Self {
            groups: result.groups.iter().map(JsonGroup::from_group).collect(),
            errors: result.per_file_errors.clone(),
            walk_errors: Vec::new(),
            warnings: result.warnings.clone(),
            summary: JsonSummary {
                stats: result.stats.clone(),
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            },
        }
    }

    /// Include traversal failures.
    #[must_use]
    pub fn with_walk_errors(mut self, errors: &[WalkError]) -> Self {
        self.walk_errors = errors.iter().map(ToString::to_string).collect();
        self
    }

    /// Serialize to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty-printed JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)
    }
}
