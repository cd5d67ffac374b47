use std::path::PathBuf;

use crate::config::Config;
use crate::theory::abs::data::Term;
use crate::theory::abs::def::{Body, Env, Sigma};
use crate::theory::abs::meta::Metas;
use crate::theory::abs::normalize::{Memo, Normalizer};
use crate::theory::{qualify, Loc};
use crate::{Driver, Error, ModuleReport, Source};

mod cache;
mod fail_ambiguous;
mod fail_cycle;
mod fail_dependency;
mod fail_goal;
mod fail_instance_depth;
mod fail_level;
mod fail_nonexhaustive;
mod fail_termination;
mod fail_unsolved;
mod levels;
mod ok_dependent;
mod ok_indexed;
mod ok_instance;
mod ok_instance_recursive;
mod ok_lifting;
mod ok_nat;
mod ok_path;
mod ok_pattern;
mod ok_superclass;
mod prelude;
mod properties;
mod unify;

fn root(mod_path: &str) -> PathBuf {
    let mut dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    dir.extend(["src", "tests", mod_path.split("::").last().unwrap()]);
    dir
}

pub fn run(mod_path: &str) -> Result<(Driver, Vec<ModuleReport>), Error> {
    let mut driver = Driver::new(Config::default());
    let reports = driver.check_dir(&root(mod_path))?;
    Ok((driver, reports))
}

pub fn run_ok(mod_path: &str) -> (Driver, Vec<ModuleReport>) {
    let (driver, reports) = run(mod_path).unwrap();
    for r in &reports {
        r.print();
        assert!(r.is_ok(), "{} is {}", r.name(), r.status);
    }
    (driver, reports)
}

/// The first error of the first failing module.
pub fn run_err(mod_path: &str) -> Error {
    match run(mod_path) {
        Ok((_, reports)) => reports
            .into_iter()
            .flat_map(|r| r.errors)
            .next()
            .expect("expected an error"),
        Err(e) => e,
    }
}

/// Checks one inline module, failing with its first error.
pub fn check_src(text: &str) -> Result<Driver, Error> {
    let mut driver = Driver::new(Config::default());
    let reports = driver.check_sources(vec![Source::new("index", text)])?;
    match reports.into_iter().flat_map(|r| r.errors).next() {
        Some(e) => Err(e),
        None => Ok(driver),
    }
}

/// The elaborated body of function `name` in module `index`.
pub fn body<'a>(sigma: &'a Sigma, name: &str) -> &'a Term {
    match &sigma.get(&qualify("index", name)).unwrap().body {
        Body::Fn { body, .. } => body,
        _ => panic!("{name} is not a function"),
    }
}

/// The normal form of function `name` in module `index`.
pub fn value(sigma: &Sigma, name: &str) -> Term {
    let metas = Metas::default();
    let mut memo = Memo::default();
    Normalizer::new(
        Env::from(sigma),
        &metas,
        &mut memo,
        &[],
        Config::default().reduction_fuel,
        Loc::default(),
    )
    .nf(body(sigma, name))
    .unwrap()
}
