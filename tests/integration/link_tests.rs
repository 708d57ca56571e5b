//! Hardlinks and symlinks: one file on disk is never its own duplicate.

#![cfg(unix)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use dupengine::config::ScanConfig;
use dupengine::duplicates::{Engine, ScanResult, ScanWarning};
use dupengine::scanner::{walk_all, FileIdentity, ScanMode, WalkerConfig};
use tempfile::tempdir;

fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().write_all(content).unwrap();
}

fn scan(roots: &[PathBuf], config: &WalkerConfig) -> (Vec<FileIdentity>, ScanResult) {
    let (items, errors) = walk_all(roots, config, None);
    assert!(errors.is_empty(), "walk errors: {:?}", errors);
    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .scan(items.clone())
        .unwrap();
    (items, result)
}

#[test]
fn test_hardlinks_to_same_file_not_counted_as_duplicates() {
    let dir = tempdir().unwrap();
    let original = dir.path().join("original.txt");
    let hardlink = dir.path().join("hardlink.txt");
    write(&original, b"identical content");

    if let Err(e) = fs::hard_link(&original, &hardlink) {
        eprintln!("Skipping hardlink test: failed to create hardlink: {}", e);
        return;
    }

    let (items, result) = scan(&[dir.path().to_path_buf()], &WalkerConfig::default());
    assert!(result.groups.is_empty());
    assert_eq!(items.len(), 1);
}

#[test]
fn test_hardlink_across_roots_is_reported_once() {
    let dir = tempdir().unwrap();
    let r1 = dir.path().join("r1");
    let r2 = dir.path().join("r2");
    write(&r1.join("x.bin"), b"one inode, two names");
    fs::create_dir_all(&r2).unwrap();

    if let Err(e) = fs::hard_link(r1.join("x.bin"), r2.join("y.bin")) {
        eprintln!("Skipping hardlink test: failed to create hardlink: {}", e);
        return;
    }

    let (items, result) = scan(&[r1, r2], &WalkerConfig::default());
    assert!(result.groups.is_empty());
    assert_eq!(items.len(), 1);
}

#[test]
fn test_hardlink_beside_real_copy_groups_once() {
    let dir = tempdir().unwrap();
    let r1 = dir.path().join("r1");
    let r2 = dir.path().join("r2");
    write(&r1.join("x.bin"), b"shared payload");
    write(&r2.join("copy.bin"), b"shared payload");

    if let Err(e) = fs::hard_link(r1.join("x.bin"), r2.join("y.bin")) {
        eprintln!("Skipping hardlink test: failed to create hardlink: {}", e);
        return;
    }

    let (_, result) = scan(&[r1, r2], &WalkerConfig::default());
    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].len(), 2);
}

#[test]
fn test_symlinks_not_followed_by_default() {
    let dir = tempdir().unwrap();
    let original = dir.path().join("original.txt");
    write(&original, b"content");
    std::os::unix::fs::symlink(&original, dir.path().join("symlink.txt")).unwrap();

    let (items, result) = scan(&[dir.path().to_path_buf()], &WalkerConfig::default());
    assert_eq!(items.len(), 1);
    assert!(result.groups.is_empty());
}

#[test]
fn test_followed_symlink_is_not_a_duplicate_of_its_target() {
    let dir = tempdir().unwrap();
    let real = dir.path().join("real.bin");
    write(&real, b"content");
    std::os::unix::fs::symlink(&real, dir.path().join("link.bin")).unwrap();

    let config = WalkerConfig::default().with_follow_symlinks(true);
    let (items, result) = scan(&[dir.path().to_path_buf()], &config);
    assert_eq!(items.len(), 1);
    assert!(result.groups.is_empty());
}

#[test]
fn test_followed_directory_symlink_reports_each_file_once() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("data/a.bin"), b"same bytes");
    write(&dir.path().join("data/b.bin"), b"same bytes");
    std::os::unix::fs::symlink(dir.path().join("data"), dir.path().join("alias")).unwrap();

    let config = WalkerConfig::default().with_follow_symlinks(true);
    let (items, result) = scan(&[dir.path().to_path_buf()], &config);
    assert_eq!(items.len(), 2);
    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].len(), 2);
}

#[test]
fn test_engine_drops_links_supplied_directly() {
    let dir = tempdir().unwrap();
    let real = dir.path().join("real.bin");
    let link = dir.path().join("link.bin");
    write(&real, b"supplied twice");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let items = vec![
        FileIdentity::from_path(&real).unwrap(),
        FileIdentity::from_path(&link).unwrap(),
    ];
    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .scan(items)
        .unwrap();
    assert!(result.groups.is_empty());
    assert_eq!(result.warnings, vec![ScanWarning::SameFileIgnored { count: 1 }]);
}

#[test]
fn test_symlink_cycle_detection() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    std::os::unix::fs::symlink(&sub, sub.join("link")).unwrap();

    let config = WalkerConfig::default().with_follow_symlinks(true);
    let (items, _loop_errors) = walk_all(&[dir.path().to_path_buf()], &config, None);
    assert!(items.is_empty());
}
