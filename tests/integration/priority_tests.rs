//! Reference selection inside duplicate groups.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use dupengine::config::ScanConfig;
use dupengine::duplicates::{Criterion, CustomOrder, Engine, PriorityRule, ScanWarning};
use dupengine::scanner::{FileIdentity, ScanMode};
use filetime::{set_file_mtime, FileTime};
use tempfile::tempdir;

fn write(dir: &Path, name: &str, content: &[u8], mtime: i64) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    path
}

fn scan(rule: PriorityRule, paths: &[&PathBuf]) -> dupengine::duplicates::ScanResult {
    let items = paths
        .iter()
        .map(|p| FileIdentity::from_path(p).unwrap())
        .collect();
    Engine::new(ScanConfig::new(ScanMode::Exact).with_priority(rule))
        .scan(items)
        .unwrap()
}

#[test]
fn test_default_rule_picks_first_path() {
    let dir = tempdir().unwrap();
    let b = write(dir.path(), "b/photo.png", b"same bytes", 100);
    let a = write(dir.path(), "a/photo.png", b"same bytes", 200);

    let result = scan(PriorityRule::default(), &[&b, &a]);
    assert_eq!(result.groups[0].reference().path, a);
    assert!(result.warnings.is_empty());
}

#[test]
fn test_folder_preference_wins_over_path_order() {
    let dir = tempdir().unwrap();
    let master = dir.path().join("master");
    let a = write(dir.path(), "inbox/a.jpg", b"picture!", 100);
    let kept = write(dir.path(), "master/z.jpg", b"picture!", 100);
    let b = write(dir.path(), "inbox/b.jpg", b"picture!", 100);

    let rule = PriorityRule::new(vec![Criterion::Folder {
        folders: vec![master],
    }]);
    let result = scan(rule, &[&a, &kept, &b]);

    let group = &result.groups[0];
    assert_eq!(group.reference().path, kept);
    let rest: Vec<&Path> = group.duplicates().iter().map(|m| m.identity.path.as_path()).collect();
    assert_eq!(rest, vec![a.as_path(), b.as_path()]);
}

#[test]
fn test_later_criteria_break_ties() {
    let dir = tempdir().unwrap();
    let old = write(dir.path(), "x/old.txt", b"tie breaker", 1_000);
    let new = write(dir.path(), "x/new.txt", b"tie breaker", 2_000);
    let elsewhere = write(dir.path(), "y/newest.txt", b"tie breaker", 3_000);
    let x = dir.path().join("x");

    let rule: PriorityRule = format!("folder={},newest", x.display()).parse().unwrap();
    let result = scan(rule, &[&old, &new, &elsewhere]);
    assert_eq!(result.groups[0].reference().path, new);

    let rule: PriorityRule = "oldest".parse().unwrap();
    let result = scan(rule, &[&old, &new, &elsewhere]);
    assert_eq!(result.groups[0].reference().path, old);
}

#[test]
fn test_filename_preference() {
    let dir = tempdir().unwrap();
    let copy = write(dir.path(), "a - Copy.doc", b"contents", 10);
    let original = write(dir.path(), "b.doc", b"contents", 10);

    let rule: PriorityRule = "name-lacks=copy".parse().unwrap();
    let result = scan(rule, &[&copy, &original]);
    assert_eq!(result.groups[0].reference().path, original);
}

#[test]
fn test_unrankable_rule_falls_back_with_warning() {
    let dir = tempdir().unwrap();
    let b = write(dir.path(), "b", b"dup", 10);
    let a = write(dir.path(), "a", b"dup", 10);

    let rule = PriorityRule::new(vec![Criterion::Custom(CustomOrder::new(
        "undecided",
        |_: &FileIdentity, _: &FileIdentity| -> Option<Ordering> { None },
    ))]);
    let result = scan(rule, &[&b, &a]);

    assert_eq!(result.groups[0].reference().path, a);
    assert_eq!(result.warnings, vec![ScanWarning::PriorityFallback { groups: 1 }]);
}
