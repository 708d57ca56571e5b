//! Subcommand dispatch for the binary.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::cache::{FingerprintCache, SqliteStore};
use crate::cli::{CacheAction, CacheArgs, Cli, Commands, ConfigAction, OutputFormat, ScanArgs};
use crate::config::Config;
use crate::duplicates::{Engine, EngineError, PriorityRule};
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::output::{CsvOutput, JsonOutput, TextOutput};
use crate::progress::{Progress, ProgressCallback, PHASE_WALK};
use crate::scanner::{walk_all, FingerprintExtractor, ScanMode, WalkerConfig};
use crate::signal;

/// Run the parsed command line.
///
/// # Errors
///
/// Returns an error for invalid configuration, an unusable cache path in
/// the `cache` subcommand, output failures and interrupted scans
/// ([`EngineError::Interrupted`]).
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    if let Err(e) = init_logging(cli.verbose, cli.quiet) {
        log::debug!("Logger already installed: {}", e);
    }

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Scan(args) => run_scan(args, config, cli.quiet),
        Commands::Cache(args) => run_cache(&args, &config),
        Commands::Config(args) => match args.action {
            ConfigAction::Show => {
                let text = toml::to_string_pretty(&config).context("Failed to encode configuration")?;
                print!("{text}");
                Ok(ExitCode::Success)
            }
            ConfigAction::Init { force } => {
                let path = cli
                    .config
                    .or_else(Config::default_path)
                    .context("No configuration directory available; pass --config")?;
                if path.exists() && !force {
                    bail!("{} already exists (use --force to overwrite)", path.display());
                }
                config.save(&path)?;
                println!("Wrote {}", path.display());
                Ok(ExitCode::Success)
            }
        },
    }
}

/// Fold command-line flags into the loaded configuration.
fn apply_overrides(config: &mut Config, args: &ScanArgs) {
    let scan = &mut config.scan;
    if let Some(mode) = args.mode {
        scan.mode = mode;
    }
    if let Some(threshold) = args.threshold {
        scan.threshold = threshold;
    }
    if let Some(workers) = args.workers {
        scan.worker_count = workers;
    }
    if let Some(grid) = args.grid_size {
        scan.grid_size = grid;
    }
    if let Some(segments) = args.audio_segments {
        scan.audio_segments = segments;
    }
    if !args.prefer.is_empty() {
        scan.priority = PriorityRule::new(args.prefer.clone());
    }
    if args.budget_ms.is_some() {
        scan.extraction_budget_ms = args.budget_ms;
    }
    scan.prune_cache |= args.prune_cache;

    if args.no_cache {
        config.use_cache = false;
    }
    if let Some(ref path) = args.cache {
        config.cache_path = Some(path.clone());
    }
    config.walk.follow_symlinks |= args.follow_symlinks;
    config.walk.skip_hidden |= args.skip_hidden;
    config.walk.ignore_patterns.extend(args.ignore_patterns.iter().cloned());
}

fn walker_config(config: &Config, args: &ScanArgs) -> WalkerConfig {
    let extensions = if args.extensions.is_empty() {
        config
            .scan
            .mode
            .default_extensions()
            .iter()
            .map(|e| (*e).to_string())
            .collect()
    } else {
        args.extensions.clone()
    };
    WalkerConfig::default()
        .with_follow_symlinks(config.walk.follow_symlinks)
        .with_skip_hidden(config.walk.skip_hidden)
        .with_min_size(args.min_size)
        .with_max_size(args.max_size)
        .with_ignore_patterns(config.walk.ignore_patterns.clone())
        .with_extensions(extensions)
}

fn cache_path(config: &Config, explicit: Option<&PathBuf>) -> Option<PathBuf> {
    explicit
        .cloned()
        .or_else(|| config.cache_path.clone())
        .or_else(SqliteStore::default_path)
}

/// Open the scan cache. Failure to open degrades to no caching.
fn open_scan_cache(config: &Config) -> Option<Arc<FingerprintCache>> {
    if !config.use_cache {
        log::debug!("Fingerprint cache disabled");
        return None;
    }
    let cache = match cache_path(config, None) {
        Some(path) => match FingerprintCache::open(&path) {
            Ok(cache) => {
                log::debug!("Using fingerprint cache at {}", path.display());
                cache
            }
            Err(e) => {
                FingerprintCache::disabled(format!("cannot open {}: {}", path.display(), e))
            }
        },
        None => FingerprintCache::disabled("no cache directory available"),
    };
    Some(Arc::new(cache))
}

fn run_scan(args: ScanArgs, mut config: Config, quiet: bool) -> Result<ExitCode> {
    apply_overrides(&mut config, &args);
    config.scan.validate().context("Invalid scan options")?;

    let handler = signal::create_handler();

    let cache = open_scan_cache(&config);
    if args.clear_cache {
        if let Some(ref cache) = cache {
            cache.clear().context("Failed to clear fingerprint cache")?;
            log::info!("Fingerprint cache cleared");
        }
    }

    let show_progress = !quiet && args.output == OutputFormat::Text;
    let progress = Arc::new(Progress::new(!show_progress));

    progress.on_phase_start(PHASE_WALK, 0);
    let (items, walk_errors) = walk_all(
        &args.paths,
        &walker_config(&config, &args),
        Some(handler.flag()),
    );
    progress.on_phase_end(PHASE_WALK);

    if handler.is_shutdown_requested() {
        return Err(EngineError::Interrupted {
            processed: 0,
            total: items.len(),
        }
        .into());
    }
    for error in &walk_errors {
        log::warn!("{}", error);
    }

    let mut engine = Engine::new(config.scan.clone())
        .with_shutdown_flag(handler.flag())
        .with_progress(progress);
    if let Some(cache) = cache {
        engine = engine.with_cache(cache);
    }
    let result = engine.scan(items)?;

    let mut exit_code = ExitCode::for_result(&result);
    if !walk_errors.is_empty() {
        exit_code = ExitCode::PartialSuccess;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Text => TextOutput::new(&result)
            .with_walk_errors(&walk_errors)
            .write_to(&mut out)
            .context("Failed to write results")?,
        OutputFormat::Json => JsonOutput::new(&result, exit_code)
            .with_walk_errors(&walk_errors)
            .write_to(&mut out)
            .context("Failed to write JSON output")?,
        OutputFormat::Csv => CsvOutput::new(&result.groups)
            .write_to(&mut out)
            .context("Failed to write CSV output")?,
    }
    out.flush().context("Failed to flush output")?;

    Ok(exit_code)
}

fn run_cache(args: &CacheArgs, config: &Config) -> Result<ExitCode> {
    let path = cache_path(config, args.cache.as_ref())
        .context("No cache directory available; pass --cache")?;
    let cache = FingerprintCache::open(&path)
        .with_context(|| format!("Failed to open cache at {}", path.display()))?;

    match args.action {
        CacheAction::Info => {
            println!("Cache: {}", path.display());
            println!("Entries: {}", cache.len()?);
            for mode in [ScanMode::Exact, ScanMode::Picture, ScanMode::Audio] {
                let namespace = FingerprintExtractor::with_params(
                    mode,
                    config.scan.grid_size,
                    config.scan.audio_segments,
                )
                .namespace();
                println!("  {:<12} {}", namespace, cache.paths(&namespace)?.len());
            }
        }
        CacheAction::Clear => {
            let removed = cache.len()?;
            cache.clear()?;
            println!("Removed {} entries from {}", removed, path.display());
        }
    }
    Ok(ExitCode::Success)
}
