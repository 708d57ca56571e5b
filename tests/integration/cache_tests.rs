//! Fingerprint cache behaviour across scans and process restarts.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dupengine::cache::{CacheEntry, FingerprintCache, KvStore, SqliteStore};
use dupengine::config::ScanConfig;
use dupengine::duplicates::Engine;
use dupengine::scanner::{FileIdentity, Fingerprint, Hasher, ScanMode};
use filetime::{set_file_mtime, FileTime};
use tempfile::tempdir;

fn identity(path: &Path) -> FileIdentity {
    FileIdentity::from_path(path).unwrap()
}

#[test]
fn test_lookup_after_store_until_identity_changes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("f");
    fs::write(&path, b"hello").unwrap();
    let id = identity(&path);
    let fp = Fingerprint::Exact(Hasher::new().hash_bytes(b"hello"));

    let cache = FingerprintCache::in_memory();
    cache.store("exact", &id, &fp).unwrap();
    assert_eq!(cache.lookup("exact", &id).unwrap(), Some(fp.clone()));

    let resized = FileIdentity::new(id.path.clone(), id.size + 1, id.modified);
    assert_eq!(cache.lookup("exact", &resized).unwrap(), None);

    cache.store("exact", &id, &fp).unwrap();
    let touched = FileIdentity::new(id.path.clone(), id.size, id.modified + Duration::from_secs(5));
    assert_eq!(cache.lookup("exact", &touched).unwrap(), None);
    assert_eq!(cache.stats().stale, 2);
}

#[test]
fn test_stale_entry_is_reextracted_and_replaced() {
    let dir = tempdir().unwrap();
    let d = dir.path().join("d.txt");
    let twin = dir.path().join("twin.txt");
    fs::write(&d, b"old content").unwrap();
    fs::write(&twin, b"new content").unwrap();

    let t0 = FileTime::from_unix_time(1_600_000_000, 0);
    set_file_mtime(&d, t0).unwrap();

    let cache = Arc::new(FingerprintCache::in_memory());
    let engine = Engine::new(ScanConfig::new(ScanMode::Exact)).with_cache(Arc::clone(&cache));
    let first = engine.scan(vec![identity(&d), identity(&twin)]).unwrap();
    assert!(first.groups.is_empty());

    fs::write(&d, b"new content").unwrap();
    let t1 = FileTime::from_unix_time(1_700_000_000, 0);
    set_file_mtime(&d, t1).unwrap();
    let d_now = identity(&d);
    assert_ne!(d_now.modified, SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000));

    let second = engine.scan(vec![d_now.clone(), identity(&twin)]).unwrap();
    assert_eq!(second.stats.stale_entries, 1);
    assert_eq!(second.stats.extracted, 1);
    assert_eq!(second.stats.cache_hits, 1);
    assert_eq!(second.groups.len(), 1);

    let cached = cache.lookup("exact", &d_now).unwrap();
    assert_eq!(
        cached,
        Some(Fingerprint::Exact(Hasher::new().hash_bytes(b"new content")))
    );
}

#[test]
fn test_rescan_unchanged_is_all_hits_and_identical() {
    let dir = tempdir().unwrap();
    for (name, content) in [("a", "same"), ("b", "same"), ("c", "diff"), ("d", "diff")] {
        fs::write(dir.path().join(name), content).unwrap();
    }
    let items: Vec<FileIdentity> = ["a", "b", "c", "d"]
        .iter()
        .map(|n| identity(&dir.path().join(n)))
        .collect();

    let cache = Arc::new(FingerprintCache::in_memory());
    let engine = Engine::new(ScanConfig::new(ScanMode::Exact)).with_cache(cache);

    let first = engine.scan(items.clone()).unwrap();
    let second = engine.scan(items).unwrap();

    assert_eq!(first.groups, second.groups);
    assert_eq!(first.stats.extracted, 4);
    assert_eq!(second.stats.extracted, 0);
    assert_eq!(second.stats.cache_hits, 4);
}

#[test]
fn test_sqlite_cache_survives_reopen() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("cache").join("fingerprints.db");
    let file_a = dir.path().join("a");
    let file_b = dir.path().join("b");
    fs::write(&file_a, b"persisted").unwrap();
    fs::write(&file_b, b"persisted").unwrap();
    let items = vec![identity(&file_a), identity(&file_b)];

    {
        let cache = Arc::new(FingerprintCache::open(&db).unwrap());
        let result = Engine::new(ScanConfig::new(ScanMode::Exact))
            .with_cache(cache)
            .scan(items.clone())
            .unwrap();
        assert_eq!(result.stats.extracted, 2);
    }

    let cache = Arc::new(FingerprintCache::open(&db).unwrap());
    assert_eq!(cache.len().unwrap(), 2);
    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .with_cache(cache)
        .scan(items)
        .unwrap();
    assert_eq!(result.stats.extracted, 0);
    assert_eq!(result.stats.cache_hits, 2);
    assert_eq!(result.groups.len(), 1);
}

#[test]
fn test_corrupt_entry_is_a_miss_and_evicted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("x");
    fs::write(&path, b"abc").unwrap();
    let id = identity(&path);

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let key = dupengine::cache::entry_key("exact", &id.path);
    store.put(&key, b"{not json").unwrap();

    let cache = FingerprintCache::new(store.clone());
    assert_eq!(cache.lookup("exact", &id).unwrap(), None);
    assert_eq!(cache.stats().corrupt, 1);
    assert_eq!(store.get(&key).unwrap(), None);
    assert!(!cache.is_degraded());
}

#[test]
fn test_modes_do_not_share_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("x");
    fs::write(&path, b"abc").unwrap();
    let id = identity(&path);
    let cache = FingerprintCache::in_memory();

    cache
        .store("exact", &id, &Fingerprint::Exact(Hasher::new().hash_bytes(b"abc")))
        .unwrap();
    assert_eq!(cache.lookup("picture/16", &id).unwrap(), None);
    assert_eq!(cache.paths("exact").unwrap(), vec![id.path.clone()]);
    assert!(cache.paths("picture/16").unwrap().is_empty());
}

#[test]
fn test_entry_encoding_records_identity() {
    let id = FileIdentity::new(
        "/music/song.wav".into(),
        1234,
        SystemTime::UNIX_EPOCH + Duration::from_secs(99),
    );
    let entry = CacheEntry::new(&id, Fingerprint::Exact([7u8; 32]));
    let decoded = CacheEntry::from_bytes(&entry.to_bytes().unwrap()).unwrap();
    assert!(decoded.is_valid_for(&id));
    assert_eq!(decoded.fingerprint, Fingerprint::Exact([7u8; 32]));
}

#[test]
fn test_unopenable_cache_degrades_scan_with_warning() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"file").unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, b"dup").unwrap();
    fs::write(&b, b"dup").unwrap();

    let cache = match FingerprintCache::open(&blocker.join("cache.db")) {
        Ok(cache) => cache,
        Err(e) => FingerprintCache::disabled(e.to_string()),
    };
    let result = Engine::new(ScanConfig::new(ScanMode::Exact))
        .with_cache(Arc::new(cache))
        .scan(vec![identity(&a), identity(&b)])
        .unwrap();

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].to_string().contains("cache unavailable"));
}

#[cfg(unix)]
#[test]
fn test_non_unicode_names_are_served_from_cache() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempdir().unwrap();
    let odd = dir.path().join(OsStr::from_bytes(b"caf\xe9.bin"));
    let twin = dir.path().join("twin.bin");
    fs::write(&odd, b"latin-1 name").unwrap();
    fs::write(&twin, b"latin-1 name").unwrap();
    let items = vec![identity(&odd), identity(&twin)];
    let db = dir.path().join("cache.db");

    let first = Engine::new(ScanConfig::new(ScanMode::Exact))
        .with_cache(Arc::new(FingerprintCache::open(&db).unwrap()))
        .scan(items.clone())
        .unwrap();
    assert_eq!(first.stats.extracted, 2);

    let second = Engine::new(ScanConfig::new(ScanMode::Exact))
        .with_cache(Arc::new(FingerprintCache::open(&db).unwrap()))
        .scan(items)
        .unwrap();
    assert_eq!(second.stats.extracted, 0);
    assert_eq!(second.stats.cache_hits, 2);
    assert!(second.warnings.is_empty());
    assert_eq!(second.groups.len(), 1);
    assert!(second.groups[0].contains(&odd));
}
