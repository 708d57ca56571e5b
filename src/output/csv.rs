//! CSV output for scan results.
//!
//! One row per group member.
//!
//! # Columns
//!
//! - `group_id`: 1-based group number
//! - `mode`: detection mode of the group
//! - `reference`: `true` for the file to keep
//! - `path`: path of the file
//! - `size`: size in bytes
//! - `modified`: modification time (RFC 3339)
//! - `score`: best match score in `[0, 1]`

use std::io;

use serde::Serialize;
use thiserror::Error;

use super::format_modified;
use crate::duplicates::DupeGroup;
use crate::scanner::ScanMode;

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    group_id: usize,
    mode: ScanMode,
    reference: bool,
    path: std::borrow::Cow<'a, str>,
    size: u64,
    modified: String,
    score: f64,
}

/// CSV output formatter.
pub struct CsvOutput<'a> {
    groups: &'a [DupeGroup],
}

impl<'a> CsvOutput<'a> {
    /// Render `groups`.
    #[must_use]
    pub fn new(groups: &'a [DupeGroup]) -> Self {
        Self { groups }
    }

    /// Write the rows, header first.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if writing or serialization fails.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        for (index, group) in self.groups.iter().enumerate() {
            for (position, member) in group.members.iter().enumerate() {
                csv_writer.serialize(CsvRow {
                    group_id: index + 1,
                    mode: group.mode,
                    reference: position == 0,
                    path: member.identity.path.to_string_lossy(),
                    size: member.identity.size,
                    modified: format_modified(member.identity.modified),
                    score: member.score,
                })?;
            }
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// The CSV document as a string.
    ///
    /// # Errors
    ///
    /// Returns `CsvOutputError` if serialization fails.
    pub fn render(&self) -> Result<String, CsvOutputError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
