//! Layered configuration loading and option validation.

use std::fs;

use dupengine::config::{Config, ConfigError, ScanConfig};
use dupengine::duplicates::{Criterion, Engine, EngineError, SizePreference};
use dupengine::scanner::ScanMode;
use tempfile::tempdir;

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.scan.mode, ScanMode::Exact);
    assert!(config.use_cache);
    assert!(config.scan.priority.is_empty());
}

#[test]
fn test_toml_file_overrides_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
use_cache = false

[scan]
mode = "picture"
threshold = 0.1
grid_size = 8

[[scan.priority]]
criterion = "folder"
folders = ["/photos/master"]

[[scan.priority]]
criterion = "size"
prefer = "largest"

[walk]
ignore_patterns = ["*.tmp"]
"#,
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert!(!config.use_cache);
    assert_eq!(config.scan.mode, ScanMode::Picture);
    assert_eq!(config.scan.threshold, 0.1);
    assert_eq!(config.scan.grid_size, 8);
    assert_eq!(
        config.scan.priority.criteria(),
        &[
            Criterion::Folder {
                folders: vec!["/photos/master".into()]
            },
            Criterion::Size {
                prefer: SizePreference::Largest
            },
        ]
    );
    assert_eq!(config.walk.ignore_patterns, vec!["*.tmp"]);
}

#[test]
fn test_environment_overrides_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[scan]\naudio_segments = 32\n").unwrap();

    std::env::set_var("DUPENGINE_SCAN__AUDIO_SEGMENTS", "128");
    std::env::set_var("DUPENGINE_WALK__SKIP_HIDDEN", "true");
    let loaded = Config::load(Some(&path));
    std::env::remove_var("DUPENGINE_SCAN__AUDIO_SEGMENTS");
    std::env::remove_var("DUPENGINE_WALK__SKIP_HIDDEN");

    let config = loaded.unwrap();
    assert_eq!(config.scan.audio_segments, 128);
    assert!(config.walk.skip_hidden);
}

#[test]
fn test_save_then_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.scan = ScanConfig::new(ScanMode::Audio)
        .with_threshold(0.2)
        .with_worker_count(3)
        .with_prune_cache(true);
    config.cache_path = Some(dir.path().join("fp.db"));
    config.save(&path).unwrap();

    let loaded = Config::load(Some(&path)).unwrap();
    assert_eq!(loaded.scan.mode, ScanMode::Audio);
    assert_eq!(loaded.scan.threshold, 0.2);
    assert_eq!(loaded.scan.worker_count, 3);
    assert!(loaded.scan.prune_cache);
    assert_eq!(loaded.cache_path, config.cache_path);
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[scan]\nthreshold = \"high\"\n").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
fn test_engine_rejects_invalid_options_before_work() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("never-read");
    let items = vec![dupengine::scanner::FileIdentity::new(
        missing,
        10,
        std::time::SystemTime::now(),
    )];

    let bad = [
        ScanConfig::new(ScanMode::Picture).with_threshold(2.0),
        ScanConfig::new(ScanMode::Exact).with_worker_count(0),
        ScanConfig::new(ScanMode::Picture).with_grid_size(1),
        ScanConfig::new(ScanMode::Audio).with_audio_segments(5000),
        ScanConfig::new(ScanMode::Exact)
            .with_extraction_budget(Some(std::time::Duration::ZERO)),
    ];
    for config in bad {
        let err = Engine::new(config).scan(items.clone()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)), "{err}");
    }
}
