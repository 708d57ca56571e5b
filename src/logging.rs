//! Logging setup for the `dupengine` binary.
//!
//! The library only uses the `log` facade; the binary installs an
//! `env_logger` backend. The level is chosen by, in priority order:
//!
//! 1. The `RUST_LOG` environment variable, if set
//! 2. `--quiet` (errors only) or `-v`/`-vv` (debug/trace)
//! 3. Info
//!
//! Third-party crates are held at `warn` unless `RUST_LOG` says otherwise,
//! so `-vv` traces the engine without drowning it in dependency output.
//!
//! Debug builds prefix each line with a timestamp and, when verbose, the
//! module path. Release builds print level and message only.
//!
//! # Example
//!
//! ```rust,no_run
//! use dupengine::logging::init_logging;
//!
//! init_logging(1, false).expect("logger already installed");
//! log::debug!("visible with -v");
//! ```

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::{LevelFilter, SetLoggerError};

const CRATE_TARGET: &str = "dupengine";

/// Install the logger.
///
/// # Arguments
///
/// * `verbose` - Verbosity count from the CLI (0=info, 1=debug, 2+=trace)
/// * `quiet` - Errors only; ignored when `RUST_LOG` is set
///
/// # Errors
///
/// Returns an error if a logger has already been installed.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<(), SetLoggerError> {
    let rust_log = env::var("RUST_LOG").ok();
    let mut builder = Builder::new();

    match rust_log {
        Some(ref spec) => {
            builder.parse_filters(spec);
        }
        None => {
            let level = determine_level(verbose, quiet);
            builder
                .filter_level(level.min(LevelFilter::Warn))
                .filter_module(CRATE_TARGET, level);
        }
    }

    configure_format(&mut builder, verbose);
    builder.try_init()?;

    match rust_log {
        Some(spec) => log::debug!("Logging configured from RUST_LOG={}", spec),
        None => log::debug!(
            "Logging initialized at level {}",
            determine_level(verbose, quiet)
        ),
    }
    Ok(())
}

/// Level selected by the CLI flags alone.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level);
            let timestamp = buf.timestamp_seconds();
            if verbose >= 1 {
                writeln!(
                    buf,
                    "{} {style}{:<5}{style:#} [{}] {}",
                    timestamp,
                    level,
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(buf, "{} {style}{:<5}{style:#} {}", timestamp, level, record.args())
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level);
            writeln!(buf, "{style}{:<5}{style:#} {}", level, record.args())
        });
    }
}

/// Name of the most verbose level currently enabled.
#[must_use]
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
