use std::fmt::{Display, Formatter};

use ustr::Ustr;

use crate::theory::abs::data::Side;
use crate::theory::{Loc, LocalVar, Name, Param, ParamInfo, Syntax, Tele};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LevelExpr {
    Const(u32),
    /// `\max (\lp + add) max`, or the same with `\lh`.
    Param { add: u32, max: u32 },
    Inf,
}

impl LevelExpr {
    /// The successor, or `None` when it does not fit in a `u32`.
    pub fn suc(self) -> Option<Self> {
        Some(match self {
            LevelExpr::Const(n) => LevelExpr::Const(n.checked_add(1)?),
            LevelExpr::Param { add, max } => LevelExpr::Param {
                add: add.checked_add(1)?,
                max: if max == 0 { 0 } else { max.checked_add(1)? },
            },
            LevelExpr::Inf => LevelExpr::Inf,
        })
    }

    pub fn max(self, other: Self) -> Self {
        use LevelExpr::*;
        match (self, other) {
            (Inf, _) | (_, Inf) => Inf,
            (Const(a), Const(b)) => Const(a.max(b)),
            (Param { add, max }, Const(c)) | (Const(c), Param { add, max }) => Param {
                add,
                max: max.max(c),
            },
            (Param { add: a, max: m }, Param { add: b, max: n }) => Param {
                add: a.max(b),
                max: m.max(n),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Unresolved(Loc, Ustr),
    Local(Loc, LocalVar),
    Global(Loc, Name),

    Univ(Loc, Option<LevelExpr>, Option<LevelExpr>),

    Pi(Loc, Param<Self>, Box<Self>),
    Lam(Loc, Param<Self>, Box<Self>),
    App(Loc, Box<Self>, ParamInfo, Box<Self>),
    Let(Loc, LocalVar, Option<Box<Self>>, Box<Self>, Box<Self>),

    Sigma(Loc, Param<Self>, Box<Self>),
    Pair(Loc, Box<Self>, Box<Self>),
    Proj(Loc, Box<Self>, Side),

    Case(Loc, Box<Self>, LocalVar, Option<Box<Self>>, Vec<Clause>),
    New(Loc, Box<Self>, Vec<Implementation>),

    Num(Loc, u64),
    Hole(Loc),
    Goal(Loc),
}

impl Syntax for Expr {}

impl Expr {
    pub fn loc(&self) -> Loc {
        use Expr::*;
        match self {
            Unresolved(loc, _)
            | Local(loc, _)
            | Global(loc, _)
            | Univ(loc, _, _)
            | Pi(loc, _, _)
            | Lam(loc, _, _)
            | App(loc, _, _, _)
            | Let(loc, _, _, _, _)
            | Sigma(loc, _, _)
            | Pair(loc, _, _)
            | Proj(loc, _, _)
            | Case(loc, _, _, _, _)
            | New(loc, _, _)
            | Num(loc, _)
            | Hole(loc)
            | Goal(loc) => *loc,
        }
    }

    pub fn pi(tele: &Tele<Self>, e: Self) -> Self {
        tele.iter().rfold(e, |b, p| {
            Expr::Pi(p.typ.loc(), p.clone(), Box::new(b))
        })
    }

    /// Collects every global this expression mentions.
    pub fn globals(&self, out: &mut Vec<(Name, Loc)>) {
        use Expr::*;
        match self {
            Global(loc, n) => out.push((*n, *loc)),
            Unresolved(..) | Local(..) | Univ(..) | Num(..) | Hole(_) | Goal(_) => {}
            Pi(_, p, b) | Lam(_, p, b) | Sigma(_, p, b) => {
                p.typ.globals(out);
                b.globals(out)
            }
            App(_, f, _, x) | Pair(_, f, x) => {
                f.globals(out);
                x.globals(out)
            }
            Let(_, _, t, a, b) => {
                if let Some(t) = t {
                    t.globals(out)
                }
                a.globals(out);
                b.globals(out)
            }
            Proj(_, a, _) => a.globals(out),
            Case(_, e, _, t, cs) => {
                e.globals(out);
                if let Some(t) = t {
                    t.globals(out)
                }
                cs.iter().for_each(|c| c.globals(out))
            }
            New(_, c, is) => {
                c.globals(out);
                is.iter().for_each(|i| i.body.globals(out))
            }
        }
    }

    /// Splits an application into its head and arguments.
    pub fn spine(&self) -> (&Expr, Vec<(ParamInfo, &Expr)>) {
        let mut args = Vec::default();
        let mut e = self;
        while let Expr::App(_, f, i, x) = e {
            args.push((*i, x.as_ref()));
            e = f;
        }
        args.reverse();
        (e, args)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use Expr::*;
        match self {
            Unresolved(_, n) => write!(f, "{n}"),
            Local(_, v) => write!(f, "{v}"),
            Global(_, n) => write!(f, "{}", crate::theory::short_name(n)),
            Univ(_, _, _) => f.write_str("\\Type"),
            Pi(_, p, b) => write!(f, "\\Pi {p} -> {b}"),
            Lam(_, p, b) => write!(f, "\\lam {} => {b}", p.info.wrap(p.var.to_string())),
            App(_, g, i, x) => match i {
                ParamInfo::Explicit => write!(f, "{g} ({x})"),
                _ => write!(f, "{g} {{{x}}}"),
            },
            Let(_, v, _, a, b) => write!(f, "\\let {v} => {a} \\in {b}"),
            Sigma(_, p, b) => write!(f, "\\Sigma {p} ({b})"),
            Pair(_, a, b) => write!(f, "({a}, {b})"),
            Proj(_, a, s) => match s {
                Side::Fst => write!(f, "({a}).1"),
                Side::Snd => write!(f, "({a}).2"),
            },
            Case(_, e, _, _, _) => write!(f, "\\case {e} \\with {{ ... }}"),
            New(_, c, _) => write!(f, "\\new {c} {{ ... }}"),
            Num(_, n) => write!(f, "{n}"),
            Hole(_) => f.write_str("_"),
            Goal(_) => f.write_str("{?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Unresolved(Loc, Ustr, Vec<Self>),
    Var(Loc, LocalVar),
    Con(Loc, Name, Vec<Self>),
    Num(Loc, u64),
    Absurd(Loc),
}

impl Pattern {
    pub fn loc(&self) -> Loc {
        use Pattern::*;
        match self {
            Unresolved(loc, _, _) | Var(loc, _) | Con(loc, _, _) | Num(loc, _) | Absurd(loc) => {
                *loc
            }
        }
    }

    fn globals(&self, out: &mut Vec<(Name, Loc)>) {
        match self {
            Pattern::Con(loc, n, ps) => {
                out.push((*n, *loc));
                ps.iter().for_each(|p| p.globals(out))
            }
            Pattern::Unresolved(_, _, ps) => ps.iter().for_each(|p| p.globals(out)),
            _ => {}
        }
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use Pattern::*;
        match self {
            Unresolved(_, n, ps) | Con(_, n, ps) => {
                f.write_str(crate::theory::short_name(n))?;
                for p in ps {
                    write!(f, " ({p})")?;
                }
                Ok(())
            }
            Var(_, v) => write!(f, "{v}"),
            Num(_, n) => write!(f, "{n}"),
            Absurd(_) => f.write_str("()"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Clause {
    pub loc: Loc,
    pub pats: Vec<Pattern>,
    /// Absent for clauses closed by an absurd pattern.
    pub rhs: Option<Expr>,
}

impl Clause {
    fn globals(&self, out: &mut Vec<(Name, Loc)>) {
        self.pats.iter().for_each(|p| p.globals(out));
        if let Some(e) = &self.rhs {
            e.globals(out)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Implementation {
    pub loc: Loc,
    pub name: Ustr,
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub enum FuncBody {
    Expr(Expr),
    Clauses(Vec<Clause>),
}

#[derive(Debug, Clone)]
pub struct CtorDecl {
    pub loc: Loc,
    pub name: Name,
    /// Patterns over every data parameter when the constructor only builds
    /// the matching instances of the type.
    pub pats: Option<Vec<Pattern>>,
    pub tele: Tele<Expr>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub loc: Loc,
    pub name: Name,
    /// Binds the field inside the class body.
    pub var: LocalVar,
    pub typ: Expr,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum DeclBody {
    Func {
        ret: Option<Expr>,
        body: FuncBody,
    },
    Data {
        sort: Option<Expr>,
        ctors: Vec<CtorDecl>,
    },
    Class {
        supers: Vec<Expr>,
        fields: Vec<FieldDecl>,
    },
    Instance {
        class: Expr,
        impls: Vec<Implementation>,
    },
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub loc: Loc,
    pub name: Name,
    pub tele: Tele<Expr>,
    pub body: DeclBody,
}

impl Decl {
    /// Every global this declaration introduces, itself first.
    pub fn names(&self) -> Vec<Name> {
        let mut ret = vec![self.name];
        match &self.body {
            DeclBody::Data { ctors, .. } => ret.extend(ctors.iter().map(|c| c.name)),
            DeclBody::Class { fields, .. } => ret.extend(fields.iter().map(|f| f.name)),
            _ => {}
        }
        ret
    }

    /// Globals mentioned anywhere in the declaration, other than its own
    /// names.
    pub fn globals(&self) -> Vec<(Name, Loc)> {
        let mut out = Vec::default();
        for p in &self.tele {
            p.typ.globals(&mut out)
        }
        match &self.body {
            DeclBody::Func { ret, body } => {
                if let Some(r) = ret {
                    r.globals(&mut out)
                }
                match body {
                    FuncBody::Expr(e) => e.globals(&mut out),
                    FuncBody::Clauses(cs) => cs.iter().for_each(|c| c.globals(&mut out)),
                }
            }
            DeclBody::Data { sort, ctors } => {
                if let Some(s) = sort {
                    s.globals(&mut out)
                }
                for c in ctors {
                    c.pats.iter().flatten().for_each(|p| p.globals(&mut out));
                    c.tele.iter().for_each(|p| p.typ.globals(&mut out))
                }
            }
            DeclBody::Class { supers, fields } => {
                supers.iter().for_each(|s| s.globals(&mut out));
                for f in fields {
                    f.typ.globals(&mut out);
                    if let Some(d) = &f.default {
                        d.globals(&mut out)
                    }
                }
            }
            DeclBody::Instance { class, impls } => {
                class.globals(&mut out);
                impls.iter().for_each(|i| i.body.globals(&mut out))
            }
        }
        let own = self.names();
        out.retain(|(n, _)| !own.contains(n));
        out
    }

    pub fn source<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.loc.start..self.loc.end).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct Import {
    pub loc: Loc,
    pub module: Ustr,
}

/// A parsed module.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: Ustr,
    pub imports: Vec<Import>,
    pub decls: Vec<Decl>,
}
