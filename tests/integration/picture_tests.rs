//! Similar-picture scans over generated PNG files.

use std::fs;
use std::path::{Path, PathBuf};

use dupengine::config::ScanConfig;
use dupengine::duplicates::Engine;
use dupengine::scanner::{FileIdentity, ScanMode};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use tempfile::tempdir;

fn horizontal(size: u32) -> GrayImage {
    GrayImage::from_fn(size, size, |x, _| Luma([(x * 255 / size) as u8]))
}

fn vertical(size: u32) -> GrayImage {
    GrayImage::from_fn(size, size, |_, y| Luma([(y * 255 / size) as u8]))
}

fn save(image: &GrayImage, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}

fn identities(paths: &[&PathBuf]) -> Vec<FileIdentity> {
    paths
        .iter()
        .map(|p| FileIdentity::from_path(p).unwrap())
        .collect()
}

#[test]
fn test_rescaled_copy_matches_original() {
    let dir = tempdir().unwrap();
    let original = horizontal(256);
    let big = save(&original, dir.path(), "big.png");
    let small = save(
        &imageops::resize(&original, 96, 96, FilterType::Triangle),
        dir.path(),
        "small.png",
    );
    let other = save(&vertical(256), dir.path(), "other.png");

    let result = Engine::new(ScanConfig::new(ScanMode::Picture).with_threshold(0.05))
        .scan(identities(&[&big, &small, &other]))
        .unwrap();

    assert_eq!(result.groups.len(), 1);
    let group = &result.groups[0];
    assert_eq!(group.paths(), vec![big.as_path(), small.as_path()]);
    assert!(!group.contains(&other));
    assert!(group.members[1].score > 0.95);
    assert!(group.members[1].score <= 1.0);
}

#[test]
fn test_larger_threshold_never_loses_matches() {
    let dir = tempdir().unwrap();
    let a = save(&horizontal(64), dir.path(), "a.png");
    let b = save(&vertical(64), dir.path(), "b.png");
    let items = identities(&[&a, &b]);

    let mut previous = 0;
    for threshold in [0.0, 0.05, 0.2, 0.5, 1.0] {
        let result = Engine::new(ScanConfig::new(ScanMode::Picture).with_threshold(threshold))
            .scan(items.clone())
            .unwrap();
        assert!(result.stats.match_edges >= previous, "threshold {threshold}");
        previous = result.stats.match_edges;
    }
    assert_eq!(previous, 1);
}

#[test]
fn test_zero_threshold_requires_identical_grid() {
    let dir = tempdir().unwrap();
    let a = save(&horizontal(128), dir.path(), "a.png");
    let b = save(&horizontal(128), dir.path(), "b.png");
    let mut shifted = horizontal(128);
    for pixel in shifted.pixels_mut() {
        pixel.0[0] = pixel.0[0].saturating_add(3);
    }
    let c = save(&shifted, dir.path(), "c.png");

    let result = Engine::new(ScanConfig::new(ScanMode::Picture).with_threshold(0.0))
        .scan(identities(&[&a, &b, &c]))
        .unwrap();

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].paths(), vec![a.as_path(), b.as_path()]);
}

#[test]
fn test_grid_size_changes_namespace_not_result() {
    let dir = tempdir().unwrap();
    let a = save(&horizontal(64), dir.path(), "a.png");
    let b = save(&horizontal(64), dir.path(), "b.png");

    for grid in [4, 16, 32] {
        let result = Engine::new(ScanConfig::new(ScanMode::Picture).with_grid_size(grid))
            .scan(identities(&[&a, &b]))
            .unwrap();
        assert_eq!(result.groups.len(), 1, "grid {grid}");
    }
}

#[test]
fn test_corrupt_picture_reported_as_decode_error() {
    let dir = tempdir().unwrap();
    let good = save(&horizontal(32), dir.path(), "good.png");
    let corrupt = dir.path().join("corrupt.png");
    let mut bytes = fs::read(&good).unwrap();
    // First byte of the IHDR width; the chunk CRC no longer matches.
    bytes[16] ^= 0xFF;
    fs::write(&corrupt, bytes).unwrap();

    let result = Engine::new(ScanConfig::new(ScanMode::Picture))
        .scan(identities(&[&good, &corrupt]))
        .unwrap();

    assert!(result.groups.is_empty());
    assert_eq!(result.per_file_errors.len(), 1);
    assert_eq!(result.per_file_errors[0].path, corrupt);
    assert_eq!(result.per_file_errors[0].kind, "decode");
}

#[test]
fn test_non_picture_is_unsupported() {
    let dir = tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    fs::write(&notes, "just some text, not pixels").unwrap();

    let result = Engine::new(ScanConfig::new(ScanMode::Picture))
        .scan(identities(&[&notes]))
        .unwrap();

    assert_eq!(result.per_file_errors.len(), 1);
    assert_eq!(result.per_file_errors[0].kind, "unsupported_format");
    assert!(result.is_partial());
}
