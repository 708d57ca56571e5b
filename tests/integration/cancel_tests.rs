//! Cancellation, extraction budgets and progress reporting.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dupengine::cache::FingerprintCache;
use dupengine::config::ScanConfig;
use dupengine::duplicates::{Engine, EngineError};
use dupengine::progress::ProgressCallback;
use dupengine::scanner::{FileIdentity, ScanMode};
use tempfile::tempdir;

/// Raises the shutdown flag once `after` files have been reported.
struct CancelAfter {
    flag: Arc<AtomicBool>,
    after: usize,
    seen: AtomicUsize,
}

impl ProgressCallback for CancelAfter {
    fn on_phase_start(&self, _phase: &str, _total: usize) {}

    fn on_progress(&self, _current: usize, _path: &str) {
        if self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.flag.store(true, Ordering::SeqCst);
        }
    }

    fn on_phase_end(&self, _phase: &str) {}
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ProgressCallback for Recorder {
    fn on_phase_start(&self, phase: &str, total: usize) {
        self.events.lock().unwrap().push(format!("start {phase} {total}"));
    }

    fn on_progress(&self, current: usize, _path: &str) {
        self.events.lock().unwrap().push(format!("progress {current}"));
    }

    fn on_phase_end(&self, phase: &str) {
        self.events.lock().unwrap().push(format!("end {phase}"));
    }
}

fn same_size_files(dir: &Path, count: usize) -> Vec<FileIdentity> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("f{i:02}"));
            fs::write(&path, format!("file {i:04}")).unwrap();
            FileIdentity::from_path(&path).unwrap()
        })
        .collect()
}

#[test]
fn test_cancel_during_extraction_reports_progress() {
    let dir = tempdir().unwrap();
    let items = same_size_files(dir.path(), 10);

    let flag = Arc::new(AtomicBool::new(false));
    let callback = Arc::new(CancelAfter {
        flag: Arc::clone(&flag),
        after: 1,
        seen: AtomicUsize::new(0),
    });
    let cache = Arc::new(FingerprintCache::in_memory());
    let engine = Engine::new(ScanConfig::new(ScanMode::Exact).with_worker_count(1))
        .with_shutdown_flag(Arc::clone(&flag))
        .with_cache(Arc::clone(&cache))
        .with_progress(callback);

    let err = engine.scan(items.clone()).unwrap_err();
    match err {
        EngineError::Interrupted { processed, total } => {
            assert_eq!(processed, 1);
            assert_eq!(total, 10);
        }
        other => panic!("expected Interrupted, got {other:?}"),
    }

    // The completed extraction stays cached.
    assert_eq!(cache.len().unwrap(), 1);
    assert!(engine.is_cancelled());
}

#[test]
fn test_cancelled_engine_stays_cancelled_until_reset() {
    let dir = tempdir().unwrap();
    let items = same_size_files(dir.path(), 3);
    let engine = Engine::new(ScanConfig::new(ScanMode::Exact));

    engine.cancel();
    assert!(matches!(
        engine.scan(items.clone()),
        Err(EngineError::Interrupted { processed: 0, .. })
    ));
    assert!(engine.scan(items.clone()).is_err());

    engine.reset_cancellation();
    let result = engine.scan(items).unwrap();
    assert_eq!(result.stats.extracted, 3);
}

#[test]
fn test_budget_exceeded_is_per_file_error() {
    let dir = tempdir().unwrap();
    let content = vec![0xA5u8; 32 * 1024 * 1024];
    let a = dir.path().join("a.bin");
    let b = dir.path().join("b.bin");
    fs::write(&a, &content).unwrap();
    fs::write(&b, &content).unwrap();
    let items = vec![
        FileIdentity::from_path(&a).unwrap(),
        FileIdentity::from_path(&b).unwrap(),
    ];

    let config = ScanConfig::new(ScanMode::Exact)
        .with_extraction_budget(Some(Duration::from_millis(1)));
    let result = Engine::new(config).scan(items).unwrap();

    assert!(!result.per_file_errors.is_empty());
    assert!(result
        .per_file_errors
        .iter()
        .all(|e| e.kind == "timed_out"));
    assert!(result.groups.is_empty());
}

#[test]
fn test_progress_phases_are_balanced() {
    let dir = tempdir().unwrap();
    let items = same_size_files(dir.path(), 4);
    let recorder = Arc::new(Recorder::default());

    Engine::new(ScanConfig::new(ScanMode::Exact).with_worker_count(2))
        .with_progress(Arc::clone(&recorder) as Arc<dyn ProgressCallback>)
        .scan(items)
        .unwrap();

    let events = recorder.events.lock().unwrap();
    assert_eq!(events.first().map(String::as_str), Some("start extract 4"));
    assert_eq!(events.last().map(String::as_str), Some("end extract"));
    assert_eq!(events.iter().filter(|e| e.starts_with("progress")).count(), 4);
}
