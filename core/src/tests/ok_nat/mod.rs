use crate::tests::{run_ok, value};
use crate::theory::abs::data::Term;
use crate::theory::abs::def::{Body, Env};
use crate::theory::abs::meta::Metas;
use crate::theory::abs::normalize::{Memo, Normalizer};
use crate::theory::{qualify, Loc};

#[test]
fn test_plus() {
    let (driver, _) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();
    assert_eq!(value(&sigma, "five"), Term::nat(5));
    assert_eq!(value(&sigma, "six").as_nat(), Some(6));
    assert_eq!(value(&sigma, "two").as_nat(), Some(2));
}

#[test]
fn test_whnf_exposes_suc() {
    let (driver, _) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();
    let d = sigma.get(&qualify("index", "five")).unwrap();
    let Body::Fn { body, .. } = &d.body else {
        panic!()
    };
    let metas = Metas::default();
    let mut memo = Memo::default();
    let whnf = Normalizer::new(Env::from(&*sigma), &metas, &mut memo, &[], 1_000, Loc::default())
        .whnf(body)
        .unwrap();
    assert!(matches!(whnf, Term::Suc(_)));
}

#[test]
fn test_decreasing() {
    let (driver, _) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();
    match &sigma.get(&qualify("index", "double")).unwrap().body {
        Body::Fn { decreasing, .. } => assert_eq!(*decreasing, Some(0)),
        _ => panic!(),
    }
    match &sigma.get(&qualify("index", "five")).unwrap().body {
        Body::Fn { decreasing, .. } => assert_eq!(*decreasing, None),
        _ => panic!(),
    }
}

#[test]
fn test_deps() {
    let (driver, _) = run_ok(module_path!());
    let sigma = driver.sigma();
    let sigma = sigma.read();
    let d = sigma.get(&qualify("index", "fiveIsFive")).unwrap();
    assert!(d.deps.contains(&qualify("Prelude", "Eq")));
    assert!(d.deps.contains(&qualify("Prelude", "idp")));
}
