//! Similar-audio scans over generated WAVE files.

use std::fs;
use std::path::{Path, PathBuf};

use dupengine::config::ScanConfig;
use dupengine::duplicates::Engine;
use dupengine::scanner::{FileIdentity, ScanMode};
use tempfile::tempdir;

fn wav_16(samples: &[i16]) -> Vec<u8> {
    let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&8000u32.to_le_bytes());
    out.extend_from_slice(&16000u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&data);
    out
}

/// Alternating-sign samples whose amplitude follows `envelope`.
fn shaped(frames: usize, gain: f64, envelope: impl Fn(f64) -> f64) -> Vec<i16> {
    (0..frames)
        .map(|i| {
            let t = i as f64 / frames as f64;
            let value = (envelope(t) * 28_000.0 * gain) as i16;
            if i % 2 == 0 {
                value
            } else {
                -value
            }
        })
        .collect()
}

fn write(dir: &Path, name: &str, samples: &[i16]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, wav_16(samples)).unwrap();
    path
}

#[test]
fn test_quieter_copy_matches() {
    let dir = tempdir().unwrap();
    let rising = |t: f64| t;
    let falling = |t: f64| 1.0 - t;
    let loud = write(dir.path(), "loud.wav", &shaped(16_000, 1.0, rising));
    let quiet = write(dir.path(), "quiet.wav", &shaped(16_000, 0.4, rising));
    let other = write(dir.path(), "other.wav", &shaped(16_000, 1.0, falling));

    let items = [&loud, &quiet, &other]
        .iter()
        .map(|p| FileIdentity::from_path(p).unwrap())
        .collect();
    let result = Engine::new(ScanConfig::new(ScanMode::Audio).with_threshold(0.05))
        .scan(items)
        .unwrap();

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].paths(), vec![loud.as_path(), quiet.as_path()]);
    assert!(result.per_file_errors.is_empty());
}

#[test]
fn test_different_lengths_same_shape_match() {
    let dir = tempdir().unwrap();
    let envelope = |t: f64| (t * std::f64::consts::PI).sin();
    let long = write(dir.path(), "long.wav", &shaped(32_000, 1.0, envelope));
    let short = write(dir.path(), "short.wav", &shaped(8_000, 1.0, envelope));

    let items = [&long, &short]
        .iter()
        .map(|p| FileIdentity::from_path(p).unwrap())
        .collect();
    let result = Engine::new(ScanConfig::new(ScanMode::Audio).with_audio_segments(32))
        .scan(items)
        .unwrap();

    assert_eq!(result.groups.len(), 1);
}

#[test]
fn test_non_wave_content_is_unsupported() {
    let dir = tempdir().unwrap();
    let fake = dir.path().join("song.mp3");
    fs::write(&fake, b"ID3\x03\x00\x00\x00\x00\x00\x00not really audio").unwrap();
    let truncated = dir.path().join("cut.wav");
    fs::write(&truncated, &wav_16(&[1, 2, 3])[..30]).unwrap();

    let items = [&fake, &truncated]
        .iter()
        .map(|p| FileIdentity::from_path(p).unwrap())
        .collect();
    let result = Engine::new(ScanConfig::new(ScanMode::Audio))
        .scan(items)
        .unwrap();

    let mut kinds: Vec<&str> = result.per_file_errors.iter().map(|e| e.kind.as_str()).collect();
    kinds.sort_unstable();
    assert_eq!(kinds, vec!["decode", "unsupported_format"]);
    assert!(result.groups.is_empty());
}
