use crate::theory::abs::data::{Sort, Term};
use crate::theory::abs::def::{Body, Def, Prim};
use crate::theory::ParamInfo::{Explicit, Implicit};
use crate::theory::{qualify, LocalVar, Name, Param, Tele};

pub const PRELUDE: &str = "Prelude";

fn implicit(name: &str, typ: Term) -> Param<Term> {
    Param::new(LocalVar::hint(name), Implicit, typ)
}

fn explicit(name: &str, typ: Term) -> Param<Term> {
    Param::new(LocalVar::hint(name), Explicit, typ)
}

fn var(i: usize) -> Box<Term> {
    Box::new(Term::Var(i))
}

fn app(f: Term, x: Term) -> Term {
    Term::App(Box::new(f), Box::new(x))
}

pub fn prim_name(name: &str) -> Name {
    qualify(PRELUDE, name)
}

/// `I -> \Type \lp \lh`, the type of path families.
fn family() -> Term {
    Term::arrow(Term::Interval, Term::Univ(Sort::params()))
}

/// The primitive part of the prelude. Derived definitions come from the
/// prelude source.
pub fn setup() -> Vec<Def> {
    vec![
        prim("Nat", Prim::Nat, vec![], Term::Univ(Sort::set0())),
        prim("zero", Prim::Zero, vec![], Term::Nat),
        prim("suc", Prim::Suc, vec![explicit("n", Term::Nat)], Term::Nat),
        nat_rec(),
        prim("I", Prim::Interval, vec![], Term::Univ(Sort::set0())),
        prim("left", Prim::Left, vec![], Term::Interval),
        prim("right", Prim::Right, vec![], Term::Interval),
        path_type(),
        path_lam(),
        at(),
    ]
}

fn prim(name: &str, p: Prim, tele: Tele<Term>, ret: Term) -> Def {
    let mut d = Def::new(Default::default(), prim_name(name), tele, ret, Body::Prim(p));
    d.collect_deps();
    d
}

fn nat_rec() -> Def {
    let motive = Term::arrow(Term::Nat, Term::Univ(Sort::params()));
    let step = Term::Pi(
        explicit("n", Term::Nat),
        Box::new(Term::arrow(
            app(Term::Var(2), Term::Var(0)),
            app(Term::Var(3), Term::Suc(var(1))),
        )),
    );
    prim(
        "Nat.rec",
        Prim::NatRec,
        vec![
            implicit("P", motive),
            explicit("z", app(Term::Var(0), Term::Zero)),
            explicit("s", step),
            explicit("n", Term::Nat),
        ],
        app(Term::Var(3), Term::Var(0)),
    )
}

fn path_type() -> Def {
    prim(
        "Path",
        Prim::Path,
        vec![
            explicit("A", family()),
            explicit("a", app(Term::Var(0), Term::Left)),
            explicit("a'", app(Term::Var(1), Term::Right)),
        ],
        Term::Univ(Sort::params()),
    )
}

fn path_lam() -> Def {
    let f = Term::Pi(
        explicit("i", Term::Interval),
        Box::new(app(Term::Var(1), Term::Var(0))),
    );
    prim(
        "path",
        Prim::PathLam,
        vec![implicit("A", family()), explicit("f", f)],
        Term::Path(
            var(1),
            Box::new(app(Term::Var(0), Term::Left)),
            Box::new(app(Term::Var(0), Term::Right)),
        ),
    )
}

fn at() -> Def {
    prim(
        "at",
        Prim::At,
        vec![
            implicit("A", family()),
            implicit("a", app(Term::Var(0), Term::Left)),
            implicit("a'", app(Term::Var(1), Term::Right)),
            explicit("p", Term::Path(var(2), var(1), var(0))),
            explicit("i", Term::Interval),
        ],
        app(Term::Var(4), Term::Var(0)),
    )
}
