use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use ustr::Ustr;

use crate::theory::abs::pretty::Printer;
use crate::theory::{Name, Param, ParamInfo, Syntax, Tele};

/// de Bruijn index, zero is the innermost binder.
pub type Ix = usize;
pub type MetaId = usize;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LevelVar {
    /// The enclosing definition's level parameter (`\lp` or `\lh`).
    Param,
    Meta(MetaId),
}

/// A universe level. `Var` stands for `max(var + add, max)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Level {
    Const(u32),
    Var { var: LevelVar, add: u32, max: u32 },
    Inf,
}

impl Level {
    pub fn var(var: LevelVar, add: u32, max: u32) -> Self {
        // `max` at or below `add` can never win.
        let max = if max <= add { 0 } else { max };
        Level::Var { var, add, max }
    }

    pub fn param() -> Self {
        Self::var(LevelVar::Param, 0, 0)
    }

    pub fn meta(m: MetaId) -> Self {
        Self::var(LevelVar::Meta(m), 0, 0)
    }

    /// The successor, or `None` when it does not fit in a `u32`.
    pub fn checked_suc(&self) -> Option<Self> {
        match *self {
            Level::Const(c) => c.checked_add(1).map(Level::Const),
            Level::Var { var, add, max } => Some(Self::var(
                var,
                add.checked_add(1)?,
                if max == 0 { 0 } else { max.checked_add(1)? },
            )),
            Level::Inf => Some(Level::Inf),
        }
    }

    /// Substitutes `with` for every occurrence of `v`, saturating at
    /// `u32::MAX`, which no universe can be typed at.
    pub fn subst(&self, v: LevelVar, with: &Level) -> Self {
        match *self {
            Level::Var { var, add, max } if var == v => match *with {
                Level::Const(c) => Level::Const(c.saturating_add(add).max(max)),
                Level::Var {
                    var: w,
                    add: a,
                    max: m,
                } => Self::var(
                    w,
                    a.saturating_add(add),
                    if m == 0 {
                        max
                    } else {
                        m.saturating_add(add).max(max)
                    },
                ),
                Level::Inf => Level::Inf,
            },
            l => l,
        }
    }

    pub fn meta_var(&self) -> Option<MetaId> {
        match self {
            Level::Var {
                var: LevelVar::Meta(m),
                ..
            } => Some(*m),
            _ => None,
        }
    }

    pub fn has_param(&self) -> bool {
        matches!(
            self,
            Level::Var {
                var: LevelVar::Param,
                ..
            }
        )
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Const(0)
    }
}

/// A pair of levels: predicative rank and homotopy (truncation) rank.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub p: Level,
    pub h: Level,
}

impl Sort {
    pub fn new(p: Level, h: Level) -> Self {
        Self { p, h }
    }

    pub fn set0() -> Self {
        Self::default()
    }

    /// The identity instantiation of a definition's own level parameters.
    pub fn params() -> Self {
        Self::new(Level::param(), Level::param())
    }

    pub fn checked_suc(&self) -> Option<Self> {
        Some(Self::new(self.p.checked_suc()?, self.h.checked_suc()?))
    }

    pub fn subst(&self, with: &Sort) -> Self {
        Self::new(
            self.p.subst(LevelVar::Param, &with.p),
            self.h.subst(LevelVar::Param, &with.h),
        )
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Side {
    Fst,
    Snd,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ClauseHead {
    Con(Name),
    Zero,
    Suc,
}

impl ClauseHead {
    pub fn arity_hint(&self) -> Option<usize> {
        match self {
            ClauseHead::Con(_) => None,
            ClauseHead::Zero => Some(0),
            ClauseHead::Suc => Some(1),
        }
    }
}

/// One branch of a case tree. The body lives under `binders.len()` new
/// binders, the last constructor argument being index zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    pub head: ClauseHead,
    pub binders: Vec<Ustr>,
    pub body: Term,
}

impl Clause {
    pub fn arity(&self) -> usize {
        self.binders.len()
    }
}

impl PartialEq for Clause {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head && self.arity() == other.arity() && self.body == other.body
    }
}

impl Eq for Clause {}

impl Hash for Clause {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.head.hash(state);
        self.arity().hash(state);
        self.body.hash(state)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Case {
    pub scrut: Term,
    /// Result type, under one binder standing for the scrutinee.
    pub motive: Term,
    pub clauses: Vec<Clause>,
}

/// `Nat.rec motive zero succ target`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NatRec {
    pub motive: Term,
    pub zero: Term,
    pub succ: Term,
    pub target: Term,
}

/// `at {A} {lhs} {rhs} path point`. The endpoints are kept for the
/// computation rules at `left` and `right`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct At {
    pub lhs: Term,
    pub rhs: Term,
    pub path: Term,
    pub point: Term,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Term {
    Univ(Sort),

    Var(Ix),
    Ref(Name, Sort),
    Meta(MetaId),

    Lam(Param<Self>, Box<Self>),
    Pi(Param<Self>, Box<Self>),
    App(Box<Self>, Box<Self>),
    Let(Param<Self>, Box<Self>, Box<Self>),

    Sigma(Param<Self>, Box<Self>),
    Pair(Box<Self>, Box<Self>),
    Proj(Box<Self>, Side),

    Data(Name, Sort, Vec<Self>),
    Con(Name, Sort, Vec<Self>, Vec<Self>),
    Case(Box<Case>),

    ClassType(Name, Sort, Vec<Self>),
    New(Name, Sort, Vec<Self>, Vec<Self>),
    Field(Box<Self>, Name, usize),

    Nat,
    Zero,
    Suc(Box<Self>),
    NatRec(Box<NatRec>),

    Interval,
    Left,
    Right,
    Path(Box<Self>, Box<Self>, Box<Self>),
    PathLam(Box<Self>),
    At(Box<At>),
}

impl Syntax for Term {}

impl Term {
    pub fn univ(p: Level, h: Level) -> Self {
        Term::Univ(Sort::new(p, h))
    }

    pub fn app(f: Term, args: impl IntoIterator<Item = Term>) -> Term {
        args.into_iter()
            .fold(f, |f, x| Term::App(Box::new(f), Box::new(x)))
    }

    pub fn lam(tele: &Tele<Term>, tm: Term) -> Term {
        tele.iter()
            .rfold(tm, |b, p| Term::Lam(p.clone(), Box::new(b)))
    }

    pub fn pi(tele: &Tele<Term>, tm: Term) -> Term {
        tele.iter()
            .rfold(tm, |b, p| Term::Pi(p.clone(), Box::new(b)))
    }

    pub fn arrow(dom: Term, cod: Term) -> Term {
        Term::Pi(
            Param::new(crate::theory::LocalVar::hint("_"), ParamInfo::Explicit, dom),
            Box::new(cod),
        )
    }

    pub fn nat(n: u64) -> Term {
        (0..n).fold(Term::Zero, |t, _| Term::Suc(Box::new(t)))
    }

    /// The numeral value of a successor chain, if it is one.
    pub fn as_nat(&self) -> Option<u64> {
        let mut n = 0;
        let mut tm = self;
        loop {
            match tm {
                Term::Zero => return Some(n),
                Term::Suc(a) => {
                    n += 1;
                    tm = a;
                }
                _ => return None,
            }
        }
    }

    /// Splits an application into its head and arguments.
    pub fn spine(&self) -> (&Term, Vec<&Term>) {
        let mut args = Vec::default();
        let mut tm = self;
        while let Term::App(f, x) = tm {
            args.push(x.as_ref());
            tm = f;
        }
        args.reverse();
        (tm, args)
    }

    pub fn into_spine(self) -> (Term, Vec<Term>) {
        let mut args = Vec::default();
        let mut tm = self;
        while let Term::App(f, x) = tm {
            args.push(*x);
            tm = *f;
        }
        args.reverse();
        (tm, args)
    }

    pub fn is_meta_headed(&self) -> Option<MetaId> {
        match self.spine().0 {
            Term::Meta(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_univ(&self) -> Option<&Sort> {
        match self {
            Term::Univ(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&Printer::default().term(self))
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Const(n) => write!(f, "{n}"),
            Level::Inf => f.write_str("\\oo"),
            Level::Var { var, add, max } => {
                let v = match var {
                    LevelVar::Param => "\\l".to_string(),
                    LevelVar::Meta(m) => format!("?l{m}"),
                };
                let v = if *add == 0 {
                    v
                } else {
                    format!("{v}+{add}")
                };
                if *max == 0 {
                    f.write_str(&v)
                } else {
                    write!(f, "\\max {v} {max}")
                }
            }
        }
    }
}

impl Display for Sort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let p = self.p.to_string().replace("\\l", "\\lp");
        let h = self.h.to_string().replace("\\l", "\\lh");
        write!(f, "({p}) ({h})")
    }
}
