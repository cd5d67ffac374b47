use crate::config::Config;
use crate::theory::abs::data::{MetaId, Sort, Term};
use crate::theory::abs::def::{Env, Sigma};
use crate::theory::abs::meta::{MetaKind, Metas};
use crate::theory::abs::normalize::Memo;
use crate::theory::abs::unify::{retry_constraints, Unifier};
use crate::theory::{qualify, Loc};

struct Fixture {
    sigma: Sigma,
    config: Config,
    metas: Metas,
    memo: Memo,
}

impl Fixture {
    fn new() -> Self {
        Self {
            sigma: Default::default(),
            config: Default::default(),
            metas: Default::default(),
            memo: Default::default(),
        }
    }

    /// A closed metavariable of type `Nat -> Nat -> Nat`.
    fn binary_meta(&mut self) -> MetaId {
        let typ = Term::arrow(Term::Nat, Term::arrow(Term::Nat, Term::Nat));
        match self.metas.fresh(&[], typ, MetaKind::Implicit, Loc::default()) {
            Term::Meta(m) => m,
            tm => panic!("unexpected {tm}"),
        }
    }

    /// Unifies under two local variables `x` (index 1) and `y` (index 0).
    fn unify(&mut self, lhs: &Term, rhs: &Term) {
        let locals = [None, None];
        Unifier::new(
            Env::from(&self.sigma),
            &mut self.metas,
            &mut self.memo,
            &locals,
            &self.config,
            Loc::default(),
        )
        .unify(lhs, rhs)
        .unwrap()
    }
}

fn f() -> Term {
    Term::Ref(qualify("Test", "f"), Sort::set0())
}

fn x() -> Term {
    Term::Var(1)
}

fn y() -> Term {
    Term::Var(0)
}

#[test]
fn test_pattern_solved() {
    let mut t = Fixture::new();
    let m = t.binary_meta();
    t.unify(
        &Term::app(Term::Meta(m), [x(), y()]),
        &Term::app(f(), [x(), y()]),
    );
    assert_eq!(t.metas.solution(m), Some(&f()));
    assert!(t.metas.constraints.is_empty());
}

#[test]
fn test_swapped_spine() {
    let mut t = Fixture::new();
    let m = t.binary_meta();
    let lhs = Term::app(Term::Meta(m), [y(), x()]);
    let rhs = Term::app(f(), [x(), y()]);
    t.unify(&lhs, &rhs);
    assert!(t.metas.solution(m).is_some_and(|s| s.is_closed()));
    assert_ne!(t.metas.solution(m), Some(&f()));
    assert_eq!(t.metas.zonk(&lhs), rhs);
}

#[test]
fn test_repeated_variable_deferred() {
    let mut t = Fixture::new();
    let m = t.binary_meta();
    t.unify(
        &Term::app(Term::Meta(m), [x(), x()]),
        &Term::app(f(), [x(), y()]),
    );
    assert_eq!(t.metas.solution(m), None);
    assert_eq!(t.metas.constraints.len(), 1);
}

#[test]
fn test_deferred_retried() {
    let mut t = Fixture::new();
    let m = t.binary_meta();
    t.unify(
        &Term::app(Term::Meta(m), [x(), x()]),
        &Term::app(f(), [x(), x()]),
    );
    assert_eq!(t.metas.constraints.len(), 1);

    t.unify(
        &Term::app(Term::Meta(m), [x(), y()]),
        &Term::app(f(), [x(), y()]),
    );
    let progress = retry_constraints(
        Env::from(&t.sigma),
        &mut t.metas,
        &mut t.memo,
        &t.config,
    )
    .unwrap();
    assert!(progress);
    assert!(t.metas.constraints.is_empty());
}

#[test]
fn test_occurs_check() {
    let mut t = Fixture::new();
    let m = t.binary_meta();
    let lhs = Term::app(Term::Meta(m), [x(), y()]);
    let rhs = Term::Suc(Box::new(lhs.clone()));
    let locals = [None, None];
    let ret = Unifier::new(
        Env::from(&t.sigma),
        &mut t.metas,
        &mut t.memo,
        &locals,
        &t.config,
        Loc::default(),
    )
    .unify(&lhs, &rhs);
    assert!(ret.is_err());
}
