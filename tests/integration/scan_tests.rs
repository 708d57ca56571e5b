//! End-to-end exact-mode scans over real files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dupengine::cache::FingerprintCache;
use dupengine::config::ScanConfig;
use dupengine::duplicates::{DupeGroup, Engine};
use dupengine::scanner::{walk_all, FileIdentity, ScanMode, WalkerConfig};
use tempfile::{tempdir, TempDir};

fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn walk(dir: &TempDir) -> Vec<FileIdentity> {
    let (items, errors) = walk_all(&[dir.path().to_path_buf()], &WalkerConfig::default(), None);
    assert!(errors.is_empty(), "walk errors: {:?}", errors);
    items
}

fn membership(groups: &[DupeGroup]) -> Vec<Vec<PathBuf>> {
    groups
        .iter()
        .map(|g| g.members.iter().map(|m| m.identity.path.clone()).collect())
        .collect()
}

#[test]
fn test_two_identical_one_different() {
    let dir = tempdir().unwrap();
    let a = write(dir.path(), "a.txt", b"XXXXXXXXXX");
    let b = write(dir.path(), "b.txt", b"XXXXXXXXXX");
    let c = write(dir.path(), "c.txt", b"YYYYYYYYYY");

    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .scan(walk(&dir))
        .unwrap();

    assert_eq!(membership(&result.groups), vec![vec![a, b]]);
    assert!(!result.groups[0].contains(&c));
    assert!(result.per_file_errors.is_empty());
    assert!(result.warnings.is_empty());
    assert_eq!(result.groups[0].members[1].score, 1.0);
}

#[test]
fn test_several_groups_in_nested_directories() {
    let dir = tempdir().unwrap();
    write(dir.path(), "one/a", b"alpha alpha");
    write(dir.path(), "two/a", b"alpha alpha");
    write(dir.path(), "two/deeper/a", b"alpha alpha");
    write(dir.path(), "one/b", b"beta beta!!");
    write(dir.path(), "three/b", b"beta beta!!");
    write(dir.path(), "unique", b"only me");

    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .scan(walk(&dir))
        .unwrap();

    assert_eq!(result.groups.len(), 2);
    let sizes: Vec<usize> = result.groups.iter().map(DupeGroup::len).collect();
    assert_eq!(sizes, vec![3, 2]);
    assert_eq!(result.stats.duplicate_items, 3);
    assert_eq!(result.stats.reclaimable_bytes, 11 * 3);
    assert_eq!(result.stats.skipped_unique_size, 1);
}

#[test]
fn test_same_size_different_content_not_grouped() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a", b"abcdefgh");
    write(dir.path(), "b", b"abcdefgX");
    write(dir.path(), "c", b"Xbcdefgh");

    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .scan(walk(&dir))
        .unwrap();

    assert!(result.groups.is_empty());
    assert_eq!(result.stats.extracted, 3);
    assert_eq!(result.stats.match_edges, 0);
}

#[test]
fn test_large_files_hashed_in_blocks() {
    let dir = tempdir().unwrap();
    let content: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let mut changed = content.clone();
    *changed.last_mut().unwrap() ^= 0xFF;
    write(dir.path(), "a.bin", &content);
    write(dir.path(), "b.bin", &content);
    write(dir.path(), "c.bin", &changed);

    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .scan(walk(&dir))
        .unwrap();

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].len(), 2);
}

#[test]
fn test_result_independent_of_worker_count_and_input_order() {
    let dir = tempdir().unwrap();
    for i in 0..40 {
        let content = format!("content-{:02}", i % 7);
        write(dir.path(), &format!("f{i:02}.dat"), content.as_bytes());
    }
    let items = walk(&dir);
    let mut reversed = items.clone();
    reversed.reverse();

    let one = Engine::new(ScanConfig::new(ScanMode::Exact).with_worker_count(1))
        .scan(items)
        .unwrap();
    let four = Engine::new(ScanConfig::new(ScanMode::Exact).with_worker_count(4))
        .scan(reversed)
        .unwrap();

    assert_eq!(one.groups.len(), 7);
    assert_eq!(one.groups, four.groups);
}

#[test]
fn test_overlapping_roots_scanned_once() {
    let dir = tempdir().unwrap();
    write(dir.path(), "sub/a", b"twin");
    write(dir.path(), "sub/b", b"twin");

    let roots = vec![dir.path().to_path_buf(), dir.path().join("sub")];
    let (items, _) = walk_all(&roots, &WalkerConfig::default(), None);
    assert_eq!(items.len(), 2);

    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .scan(items)
        .unwrap();
    assert_eq!(result.groups[0].len(), 2);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_unreadable_file_reported_and_scan_continues() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a", b"same data");
    write(dir.path(), "b", b"same data");
    let mut items = walk(&dir);
    let vanished = write(dir.path(), "c", b"same data");
    items.push(FileIdentity::from_path(&vanished).unwrap());
    fs::remove_file(&vanished).unwrap();

    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .scan(items)
        .unwrap();

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.per_file_errors.len(), 1);
    assert_eq!(result.per_file_errors[0].path, vanished);
    assert_eq!(result.stats.failed, 1);
}

#[test]
fn test_empty_files_never_grouped() {
    let dir = tempdir().unwrap();
    write(dir.path(), "e1", b"");
    write(dir.path(), "e2", b"");

    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .with_cache(Arc::new(FingerprintCache::in_memory()))
        .scan(walk(&dir))
        .unwrap();

    assert!(result.groups.is_empty());
    assert_eq!(result.stats.skipped_empty, 2);
    assert!(result.is_partial());
}
