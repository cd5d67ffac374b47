use std::fs::write;

use tempfile::tempdir;

use crate::cache::{CacheEntry, CacheStore, ContentHash, MAGIC};
use crate::config::Config;
use crate::{Driver, Error, ModuleReport, ModuleStatus, Source};

fn entry(deps: usize) -> CacheEntry {
    let mut driver = Driver::new(Config::default());
    let report = driver.prelude();
    let sigma = driver.sigma();
    let sigma = sigma.read();
    CacheEntry {
        module: "sample".to_string(),
        hash: ContentHash::of(b"sample"),
        deps: (0..deps)
            .map(|i| (format!("dep{i}"), ContentHash::of(&[i as u8])))
            .collect(),
        defs: report
            .defs
            .iter()
            .filter_map(|n| sigma.get(n).cloned())
            .collect(),
    }
}

#[test]
fn test_entry_survives_encoding() {
    for deps in [0, 12] {
        let e = entry(deps);
        assert!(!e.defs.is_empty());
        let decoded = CacheEntry::decode(&e.encode().unwrap()).unwrap();
        assert_eq!(decoded, e);
        assert!(decoded.is_valid(&e.hash, &e.deps));
    }
}

#[test]
fn test_corrupt_entry() {
    assert!(matches!(CacheEntry::decode(b""), Err(Error::CacheCorrupt(_))));
    assert!(matches!(
        CacheEntry::decode(b"not a cache file"),
        Err(Error::CacheCorrupt(_))
    ));

    let mut bytes = entry(1).encode().unwrap();
    bytes[MAGIC.len()] ^= 0xff;
    assert!(matches!(CacheEntry::decode(&bytes), Err(Error::CacheCorrupt(_))));

    let mut bytes = entry(1).encode().unwrap();
    bytes.truncate(bytes.len() / 2);
    assert!(matches!(CacheEntry::decode(&bytes), Err(Error::CacheCorrupt(_))));
}

#[test]
fn test_store_misses() {
    let dir = tempdir().unwrap();
    let store = CacheStore::new(dir.path());
    assert!(store.load("sample").is_none());

    let e = entry(0);
    store.store(&e).unwrap();
    assert_eq!(store.load("sample"), Some(e));
    assert!(store.load("other").is_none());

    write(store.path("sample"), b"garbage").unwrap();
    assert!(store.load("sample").is_none());

    store.clean().unwrap();
    assert!(!dir.path().exists());
    store.clean().unwrap();
}

const A: &str = "\\func a : Nat => 1\n";
const B: &str = "\\import a\n\\func b : Nat => suc a\n";
const C: &str = "\\func c : Nat => 2\n";

fn check(cache: &std::path::Path, a: &str) -> Vec<ModuleReport> {
    let mut driver = Driver::new(Config::default().with_cache_dir(cache));
    driver
        .check_sources(vec![
            Source::new("a", a),
            Source::new("b", B),
            Source::new("c", C),
        ])
        .unwrap()
}

fn statuses(reports: &[ModuleReport]) -> Vec<ModuleStatus> {
    reports.iter().map(|r| r.status).collect()
}

#[test]
fn test_cache_reuse() {
    use ModuleStatus::*;

    let dir = tempdir().unwrap();
    let first = check(dir.path(), A);
    assert_eq!(statuses(&first), [Checked, Checked, Checked]);

    let second = check(dir.path(), A);
    assert_eq!(statuses(&second), [Cached, Cached, Cached]);
    for (f, s) in first.iter().zip(&second) {
        assert_eq!(f.hash, s.hash);
        assert_eq!(f.defs, s.defs);
    }
}

#[test]
fn test_change_invalidates_dependents() {
    use ModuleStatus::*;

    let dir = tempdir().unwrap();
    let first = check(dir.path(), A);
    let changed = check(dir.path(), "\\func a : Nat => 5\n");
    assert_eq!(statuses(&changed), [Checked, Checked, Cached]);
    assert_ne!(first[0].hash, changed[0].hash);
    assert_ne!(first[1].hash, changed[1].hash);
    assert_eq!(first[2].hash, changed[2].hash);
}

#[test]
fn test_corrupt_entry_rechecked() {
    use ModuleStatus::*;

    let dir = tempdir().unwrap();
    check(dir.path(), A);
    write(CacheStore::new(dir.path()).path("c"), b"garbage").unwrap();
    assert_eq!(statuses(&check(dir.path(), A)), [Cached, Cached, Checked]);
    assert_eq!(statuses(&check(dir.path(), A)), [Cached, Cached, Cached]);
}

#[test]
fn test_hash_hex() {
    let h = ContentHash::of(b"abc");
    assert_eq!(
        h.to_string(),
        "6437b3ac38465133ffb63b75273a8db548c558465d79db03fd359c6cd5bd9d85"
    );
    assert_eq!(h.to_hex(), blake3::hash(b"abc").to_hex().as_str());
    assert_eq!(format!("{h:?}"), "#6437b3ac3846");
    assert_eq!(h.digest(), blake3::hash(b"abc"));
}
