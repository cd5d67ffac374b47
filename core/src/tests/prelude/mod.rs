use std::fs::read;

use tempfile::tempdir;

use crate::cache::{CacheStore, ContentHash};
use crate::config::Config;
use crate::theory::abs::builtin::{self, prim_name, PRELUDE};
use crate::theory::abs::def::Body;
use crate::{prelude, Driver, ModuleStatus};

fn fresh(dir: &std::path::Path) -> Config {
    Config {
        use_prelude_cache: false,
        ..Config::default().with_cache_dir(dir)
    }
}

#[test]
fn test_prelude() {
    let mut driver = Driver::new(Config::default());
    let report = driver.prelude();
    report.print();
    assert!(report.is_ok());
    assert_eq!(report.status, ModuleStatus::Checked);
    assert!(report.warnings.is_empty());

    let sigma = driver.sigma();
    let sigma = sigma.read();
    for n in ["Nat", "suc", "Path", "at", "plus", "mul", "minus", "Eq", "idp", "pmap"] {
        assert!(report.defs.contains(&prim_name(n)), "{n}");
        assert!(sigma.contains(&prim_name(n)), "{n}");
    }
    assert!(matches!(
        sigma.get(&prim_name("plus")).unwrap().body,
        Body::Fn { decreasing: Some(0), .. }
    ));
}

#[test]
fn test_prelude_deterministic() {
    let (one, two) = (tempdir().unwrap(), tempdir().unwrap());
    assert!(Driver::new(fresh(one.path())).prelude().is_ok());
    assert!(Driver::new(fresh(two.path())).prelude().is_ok());
    let one = read(CacheStore::new(one.path()).path(PRELUDE)).unwrap();
    let two = read(CacheStore::new(two.path()).path(PRELUDE)).unwrap();
    assert_eq!(one, two);
}

#[test]
fn test_prelude_cached() {
    let dir = tempdir().unwrap();
    let checked = Driver::new(fresh(dir.path())).prelude();
    assert_eq!(checked.status, ModuleStatus::Checked);

    let mut driver = Driver::new(Config::default().with_cache_dir(dir.path()));
    let cached = driver.prelude();
    assert_eq!(cached.status, ModuleStatus::Cached);
    assert_eq!(cached.hash, checked.hash);
    assert_eq!(cached.defs, checked.defs);
    assert!(driver.sigma().read().contains(&prim_name("pmap")));
}

#[test]
fn test_prelude_hash_covers_primitives() {
    let source = prelude::source();
    let prims = builtin::setup();
    let hash = Driver::prelude_hash(&source, &prims).unwrap();
    assert_ne!(hash, ContentHash::with_deps(source.text.as_bytes(), []));
    assert_eq!(hash, Driver::prelude_hash(&source, &builtin::setup()).unwrap());

    let fewer = &prims[..prims.len() - 1];
    assert_ne!(hash, Driver::prelude_hash(&source, fewer).unwrap());

    let report = Driver::new(Config::default()).prelude();
    assert_eq!(report.hash, Some(hash));
}

#[test]
fn test_prelude_warnings_kept() {
    let dir = tempdir().unwrap();
    let mut driver = Driver::new(fresh(dir.path()));
    let reports = driver.check_sources(Vec::default()).unwrap();
    assert!(reports.is_empty());
    assert!(driver.hash_of(PRELUDE).is_some());
    let other = tempdir().unwrap();
    let checked = Driver::new(fresh(other.path())).prelude();
    assert_eq!(driver.prelude_warnings(), checked.warnings.as_slice());
}
