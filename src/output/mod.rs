//! Renderers for scan results.
//!
//! - [`TextOutput`] for people
//! - [`JsonOutput`] for automation and scripting
//! - [`CsvOutput`] for spreadsheet import
//!
//! # Example
//!
//! ```no_run
//! use dupengine::config::ScanConfig;
//! use dupengine::duplicates::Engine;
//! use dupengine::error::ExitCode;
//! use dupengine::output::JsonOutput;
//!
//! let result = Engine::new(ScanConfig::default()).scan(Vec::new()).unwrap();
//! let output = JsonOutput::new(&result, ExitCode::for_result(&result));
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod csv;
pub mod json;

use std::io;
use std::time::SystemTime;

use bytesize::ByteSize;
use chrono::{DateTime, Utc};

use crate::duplicates::ScanResult;
use crate::scanner::WalkError;

pub use self::csv::CsvOutput;
pub use self::json::JsonOutput;

/// RFC 3339 rendering of a modification time.
#[must_use]
pub fn format_modified(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.to_rfc3339()
}

/// Plain-text listing of groups, failures and a summary.
pub struct TextOutput<'a> {
    result: &'a ScanResult,
    walk_errors: &'a [WalkError],
}

impl<'a> TextOutput<'a> {
    /// Render `result`.
    #[must_use]
    pub fn new(result: &'a ScanResult) -> Self {
        Self {
            result,
            walk_errors: &[],
        }
    }

    /// Also list traversal failures.
    #[must_use]
    pub fn with_walk_errors(mut self, errors: &'a [WalkError]) -> Self {
        self.walk_errors = errors;
        self
    }

    /// Write the listing.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: io::Write>(&self, mut w: W) -> io::Result<()> {
        for (index, group) in self.result.groups.iter().enumerate() {
            writeln!(
                w,
                "Group {} ({} files, {} reclaimable):",
                index + 1,
                group.len(),
                ByteSize(group.reclaimable_bytes())
            )?;
            for (position, member) in group.members.iter().enumerate() {
                let marker = if position == 0 { "keep" } else { "    " };
                write!(
                    w,
                    "  {} {:>10}  {}",
                    marker,
                    ByteSize(member.identity.size).to_string(),
                    member.identity.path.display()
                )?;
                if group.mode.is_fuzzy() && position > 0 {
                    write!(w, "  (similarity {:.3})", member.score)?;
                }
                writeln!(w)?;
            }
            writeln!(w)?;
        }

        if !self.result.per_file_errors.is_empty() || !self.walk_errors.is_empty() {
            writeln!(w, "Errors:")?;
            for error in self.walk_errors {
                writeln!(w, "  {}", error)?;
            }
            for error in &self.result.per_file_errors {
                writeln!(w, "  [{}] {}", error.kind, error.message)?;
            }
            writeln!(w)?;
        }

        for warning in &self.result.warnings {
            writeln!(w, "Warning: {}", warning)?;
        }

        let stats = &self.result.stats;
        writeln!(
            w,
            "{} duplicate group(s), {} duplicate file(s), {} reclaimable",
            stats.duplicate_groups,
            stats.duplicate_items,
            ByteSize(stats.reclaimable_bytes)
        )?;
        writeln!(
            w,
            "{} file(s) considered, {} fingerprinted, {} from cache, {} failed in {:.2?}",
            stats.total_items, stats.extracted, stats.cache_hits, stats.failed, stats.duration
        )
    }

    /// The listing as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn render(&self) -> io::Result<String> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
