use std::sync::OnceLock;

use proptest::prelude::*;
use ustr::Ustr;

use crate::config::Config;
use crate::theory::abs::builtin::prim_name;
use crate::theory::abs::data::{self, ClauseHead, Sort, Term};
use crate::theory::abs::def::{Env, Sigma};
use crate::theory::abs::meta::Metas;
use crate::theory::abs::normalize::{Memo, Normalizer};
use crate::theory::{Loc, LocalVar, Param, ParamInfo};
use crate::Driver;

fn term() -> impl Strategy<Value = Term> {
    let leaf = prop_oneof![
        (0usize..4).prop_map(Term::Var),
        Just(Term::Nat),
        Just(Term::Zero),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        let param = |t: Term| Param::new(LocalVar::hint("x"), ParamInfo::Explicit, t);
        prop_oneof![
            inner.clone().prop_map(|t| Term::Suc(Box::new(t))),
            (inner.clone(), inner.clone()).prop_map(|(f, x)| Term::App(Box::new(f), Box::new(x))),
            (inner.clone(), inner.clone()).prop_map(move |(a, b)| Term::Lam(param(a), Box::new(b))),
            (inner.clone(), inner).prop_map(move |(a, b)| Term::Pi(param(a), Box::new(b))),
        ]
    })
}

/// Closed arithmetic over the prelude together with its expected value.
fn arith() -> impl Strategy<Value = (Term, u64)> {
    let leaf = (0u64..5).prop_map(|n| (Term::nat(n), n));
    leaf.prop_recursive(3, 16, 2, |inner| {
        let call = |f: &str, args: Vec<Term>| Term::app(Term::Ref(prim_name(f), Sort::set0()), args);
        prop_oneof![
            inner.clone().prop_map(|(t, n)| (Term::Suc(Box::new(t)), n + 1)),
            inner.clone().prop_map(move |(t, n)| (call("pred", vec![t]), n.saturating_sub(1))),
            (inner.clone(), inner.clone())
                .prop_map(move |((a, m), (b, n))| (call("plus", vec![a, b]), m + n)),
            (inner.clone(), inner.clone())
                .prop_map(move |((a, m), (b, n))| (call("mul", vec![a, b]), m * n)),
            (inner.clone(), inner)
                .prop_map(move |((a, m), (b, n))| (call("minus", vec![a, b]), m.saturating_sub(n))),
        ]
    })
}

fn call(f: &str, args: Vec<Term>) -> Term {
    Term::app(Term::Ref(prim_name(f), Sort::set0()), args)
}

fn binder(x: &str, typ: Term) -> Param<Term> {
    Param::new(LocalVar::hint(x), ParamInfo::Explicit, typ)
}

/// `\case t \with { zero => zero | suc n => n }`.
fn pred_case(t: Term) -> Term {
    Term::Case(Box::new(data::Case {
        scrut: t,
        motive: Term::Nat,
        clauses: vec![
            data::Clause {
                head: ClauseHead::Zero,
                binders: Vec::default(),
                body: Term::Zero,
            },
            data::Clause {
                head: ClauseHead::Suc,
                binders: vec![Ustr::from("n")],
                body: Term::Var(0),
            },
        ],
    }))
}

/// `Nat.rec z (\lam _ r => suc r) t`.
fn count(z: Term, t: Term) -> Term {
    let succ = Term::Lam(
        binder("n", Term::Nat),
        Box::new(Term::Lam(
            binder("r", Term::Nat),
            Box::new(Term::Suc(Box::new(Term::Var(0)))),
        )),
    );
    Term::NatRec(Box::new(data::NatRec {
        motive: Term::Lam(binder("n", Term::Nat), Box::new(Term::Nat)),
        zero: z,
        succ,
        target: t,
    }))
}

fn at(lhs: Term, rhs: Term, path: Term, point: Term) -> Term {
    Term::At(Box::new(data::At {
        lhs,
        rhs,
        path,
        point,
    }))
}

/// Open terms over the prelude. Variables block every elimination they
/// reach, so most of these normalize to stuck terms.
fn open_term() -> impl Strategy<Value = Term> {
    let leaf = prop_oneof![
        (0usize..3).prop_map(Term::Var),
        (0u64..3).prop_map(Term::nat),
    ];
    leaf.prop_recursive(4, 24, 3, |inner| {
        let point = prop_oneof![
            Just(Term::Left),
            Just(Term::Right),
            (0usize..3).prop_map(Term::Var),
        ];
        let path = prop_oneof![
            (0usize..3).prop_map(Term::Var),
            inner.clone().prop_map(|b| {
                Term::PathLam(Box::new(Term::Lam(binder("i", Term::Interval), Box::new(b))))
            }),
        ];
        prop_oneof![
            inner.clone().prop_map(|t| Term::Suc(Box::new(t))),
            inner.clone().prop_map(|t| call("pred", vec![t])),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| call("plus", vec![a, b])),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| call("minus", vec![a, b])),
            inner.clone().prop_map(|b| Term::Lam(binder("x", Term::Nat), Box::new(b))),
            inner.clone().prop_map(pred_case),
            (inner.clone(), inner.clone()).prop_map(|(z, t)| count(z, t)),
            (inner.clone(), inner, path, point).prop_map(|(a, b, p, i)| at(a, b, p, i)),
        ]
    })
}

fn prelude() -> &'static Sigma {
    static PRELUDE: OnceLock<Sigma> = OnceLock::new();
    PRELUDE.get_or_init(|| {
        let mut driver = Driver::new(Config::default());
        assert!(driver.prelude().is_ok());
        let sigma = driver.sigma();
        let sigma = sigma.read().clone();
        sigma
    })
}

fn nf(tm: &Term) -> Term {
    let metas = Metas::default();
    let mut memo = Memo::default();
    Normalizer::new(
        Env::from(prelude()),
        &metas,
        &mut memo,
        &[],
        Config::default().reduction_fuel,
        Loc::default(),
    )
    .nf(tm)
    .unwrap()
}

proptest! {
    #[test]
    fn test_shift_subst_commute(e in term(), r in term(), d in 0isize..3) {
        prop_assert_eq!(e.subst(&r).shift(d, 0), e.shift(d, 1).subst(&r.shift(d, 0)));
    }

    #[test]
    fn test_subst_lifted(e in term(), r in term()) {
        prop_assert_eq!(e.lift(1).subst(&r), e);
    }

    #[test]
    fn test_arith_normal_form((e, n) in arith()) {
        let v = nf(&e);
        prop_assert_eq!(&v, &Term::nat(n));
        prop_assert_eq!(nf(&v), v);
    }

    #[test]
    fn test_open_normal_form(e in open_term()) {
        let v = nf(&e);
        prop_assert_eq!(nf(&v), v);
    }
}

#[test]
fn test_stuck_normal_forms() {
    let x = Term::Var(0);
    let cases = [
        (call("plus", vec![x.clone(), Term::nat(2)]), call("plus", vec![x.clone(), Term::nat(2)])),
        (
            call("plus", vec![Term::nat(1), call("pred", vec![x.clone()])]),
            Term::Suc(Box::new(call("pred", vec![x.clone()]))),
        ),
        (pred_case(Term::nat(3)), Term::nat(2)),
        (count(Term::Zero, Term::nat(2)), Term::nat(2)),
        (
            count(call("plus", vec![Term::Zero, Term::Zero]), x.clone()),
            count(Term::Zero, x.clone()),
        ),
        (at(Term::nat(1), Term::nat(2), x.clone(), Term::Left), Term::nat(1)),
        (at(Term::nat(1), Term::nat(2), x.clone(), Term::Right), Term::nat(2)),
        (
            at(Term::Zero, Term::Zero, x.clone(), Term::Var(1)),
            at(Term::Zero, Term::Zero, x.clone(), Term::Var(1)),
        ),
        (
            Term::Lam(binder("x", Term::Nat), Box::new(call("plus", vec![Term::Zero, Term::Var(0)]))),
            Term::Lam(binder("x", Term::Nat), Box::new(Term::Var(0))),
        ),
    ];
    for (tm, expected) in cases {
        let v = nf(&tm);
        assert_eq!(v, expected, "{tm}");
        assert_eq!(nf(&v), v);
    }
}
