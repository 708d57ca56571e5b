//! Exit codes and machine-readable errors for the binary.

use serde::Serialize;

use crate::duplicates::{EngineError, ScanResult};

/// Process exit codes.
///
/// - 0: duplicates found
/// - 1: general error
/// - 2: no duplicates found
/// - 3: partial success (some files failed or warnings were raised)
/// - 130: interrupted by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Scan completed and duplicates were found.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Scan completed without finding duplicates.
    NoDuplicates = 2,
    /// Scan completed, but some files failed or warnings were raised.
    PartialSuccess = 3,
    /// Scan was interrupted (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DE000",
            Self::GeneralError => "DE001",
            Self::NoDuplicates => "DE002",
            Self::PartialSuccess => "DE003",
            Self::Interrupted => "DE130",
        }
    }

    /// Exit code for a completed scan.
    ///
    /// Partial success takes precedence, so a run with failures is never
    /// reported as clean.
    #[must_use]
    pub fn for_result(result: &ScanResult) -> Self {
        if result.is_partial() {
            Self::PartialSuccess
        } else if result.has_duplicates() {
            Self::Success
        } else {
            Self::NoDuplicates
        }
    }

    /// Exit code for a failed run.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<EngineError>() {
            Some(EngineError::Interrupted { .. }) => Self::Interrupted,
            _ => Self::GeneralError,
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DE001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Describe `err` for the given exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
