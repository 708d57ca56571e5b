//! dupengine - duplicate and near-duplicate content detection.
//!
//! The engine fingerprints a population of files, keeps fingerprints in a
//! persistent cache keyed by file identity, matches fingerprints exactly or
//! within a distance threshold, and groups matching files with one
//! reference item per group.
//!
//! - [`scanner`]: file identities, fingerprint extraction, traversal
//! - [`cache`]: the persistent fingerprint cache
//! - [`duplicates`]: matching, grouping, prioritising and [`duplicates::Engine`]
//! - [`config`]: scan options and the layered configuration file
//!
//! The remaining modules make up the `dupengine` binary.

pub mod cache;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

mod app;

pub use app::run_app;
