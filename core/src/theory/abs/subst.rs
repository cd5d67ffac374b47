use crate::maybe_grow;
use crate::theory::abs::data::{Clause, Ix, Level, MetaId, Sort, Term};
use crate::theory::Param;

/// Rebuilds a term bottom-up, calling `var` on every bound variable with the
/// number of binders crossed so far and `sort` on every level annotation.
struct Walker<'f, V, S>
where
    V: FnMut(usize, Ix) -> Term,
    S: FnMut(&Sort) -> Sort,
{
    var: &'f mut V,
    sort: &'f mut S,
}

impl<V, S> Walker<'_, V, S>
where
    V: FnMut(usize, Ix) -> Term,
    S: FnMut(&Sort) -> Sort,
{
    fn term(&mut self, c: usize, tm: &Term) -> Term {
        maybe_grow(move || self.term_impl(c, tm))
    }

    fn boxed(&mut self, c: usize, tm: &Term) -> Box<Term> {
        Box::new(self.term(c, tm))
    }

    fn terms(&mut self, c: usize, tms: &[Term]) -> Vec<Term> {
        tms.iter().map(|t| self.term(c, t)).collect()
    }

    fn param(&mut self, c: usize, p: &Param<Term>) -> Param<Term> {
        Param {
            var: p.var.clone(),
            info: p.info,
            typ: self.boxed(c, &p.typ),
        }
    }

    fn term_impl(&mut self, c: usize, tm: &Term) -> Term {
        use Term::*;
        match tm {
            Univ(s) => Univ((self.sort)(s)),
            Var(i) => (self.var)(c, *i),
            Ref(n, s) => Ref(*n, (self.sort)(s)),
            Meta(m) => Meta(*m),
            Lam(p, b) => Lam(self.param(c, p), self.boxed(c + 1, b)),
            Pi(p, b) => Pi(self.param(c, p), self.boxed(c + 1, b)),
            App(f, x) => App(self.boxed(c, f), self.boxed(c, x)),
            Let(p, a, b) => Let(self.param(c, p), self.boxed(c, a), self.boxed(c + 1, b)),
            Sigma(p, b) => Sigma(self.param(c, p), self.boxed(c + 1, b)),
            Pair(a, b) => Pair(self.boxed(c, a), self.boxed(c, b)),
            Proj(a, s) => Proj(self.boxed(c, a), *s),
            Data(n, s, ps) => Data(*n, (self.sort)(s), self.terms(c, ps)),
            Con(n, s, ps, xs) => Con(*n, (self.sort)(s), self.terms(c, ps), self.terms(c, xs)),
            Case(cs) => Case(Box::new(crate::theory::abs::data::Case {
                scrut: self.term(c, &cs.scrut),
                motive: self.term(c + 1, &cs.motive),
                clauses: cs
                    .clauses
                    .iter()
                    .map(|cl| Clause {
                        head: cl.head,
                        binders: cl.binders.clone(),
                        body: self.term(c + cl.arity(), &cl.body),
                    })
                    .collect(),
            })),
            ClassType(n, s, ps) => ClassType(*n, (self.sort)(s), self.terms(c, ps)),
            New(n, s, ps, fs) => New(*n, (self.sort)(s), self.terms(c, ps), self.terms(c, fs)),
            Field(a, n, i) => Field(self.boxed(c, a), *n, *i),
            Nat => Nat,
            Zero => Zero,
            Suc(a) => Suc(self.boxed(c, a)),
            NatRec(r) => NatRec(Box::new(crate::theory::abs::data::NatRec {
                motive: self.term(c, &r.motive),
                zero: self.term(c, &r.zero),
                succ: self.term(c, &r.succ),
                target: self.term(c, &r.target),
            })),
            Interval => Interval,
            Left => Left,
            Right => Right,
            Path(a, x, y) => Path(self.boxed(c, a), self.boxed(c, x), self.boxed(c, y)),
            PathLam(f) => PathLam(self.boxed(c, f)),
            At(a) => At(Box::new(crate::theory::abs::data::At {
                lhs: self.term(c, &a.lhs),
                rhs: self.term(c, &a.rhs),
                path: self.term(c, &a.path),
                point: self.term(c, &a.point),
            })),
        }
    }
}

fn walk(
    tm: &Term,
    mut var: impl FnMut(usize, Ix) -> Term,
    mut sort: impl FnMut(&Sort) -> Sort,
) -> Term {
    Walker {
        var: &mut var,
        sort: &mut sort,
    }
    .term(0, tm)
}

fn same_sort(s: &Sort) -> Sort {
    *s
}

impl Term {
    /// Adds `by` to every variable at or above `cutoff`.
    pub fn shift(&self, by: isize, cutoff: usize) -> Term {
        if by == 0 {
            return self.clone();
        }
        walk(
            self,
            |c, i| {
                if i >= c + cutoff {
                    Term::Var((i as isize + by) as usize)
                } else {
                    Term::Var(i)
                }
            },
            same_sort,
        )
    }

    pub fn lift(&self, by: usize) -> Term {
        self.shift(by as isize, 0)
    }

    /// Replaces variable `j` with `r`, closing the gap it leaves.
    pub fn subst_at(&self, j: Ix, r: &Term) -> Term {
        walk(
            self,
            |c, i| {
                if i < c + j {
                    Term::Var(i)
                } else if i == c + j {
                    r.lift(c + j)
                } else {
                    Term::Var(i - 1)
                }
            },
            same_sort,
        )
    }

    /// Instantiates the innermost binder with `r`.
    pub fn subst(&self, r: &Term) -> Term {
        self.subst_at(0, r)
    }

    /// Instantiates the `args.len()` innermost binders at once; `args[0]`
    /// replaces the outermost of them.
    pub fn subst_all(&self, args: &[Term]) -> Term {
        let n = args.len();
        if n == 0 {
            return self.clone();
        }
        walk(
            self,
            |c, i| {
                if i < c {
                    Term::Var(i)
                } else if i - c < n {
                    args[n - 1 - (i - c)].lift(c)
                } else {
                    Term::Var(i - n)
                }
            },
            same_sort,
        )
    }

    /// Turns free variable `i` into the innermost variable of one new binder
    /// around the term.
    pub fn abstract_var(&self, i: Ix) -> Term {
        walk(
            self,
            |c, v| {
                if v < c {
                    Term::Var(v)
                } else if v == c + i {
                    Term::Var(c)
                } else {
                    Term::Var(v + 1)
                }
            },
            same_sort,
        )
    }

    pub fn map_sorts(&self, f: impl FnMut(&Sort) -> Sort) -> Term {
        walk(self, |_, i| Term::Var(i), f)
    }

    /// Instantiates the level parameters of a definition.
    pub fn subst_levels(&self, s: &Sort) -> Term {
        if *s == Sort::params() {
            return self.clone();
        }
        self.map_sorts(|t| t.subst(s))
    }

    /// Renames free variables with `f`, failing if some variable has no
    /// image.
    pub fn rename_free(&self, mut f: impl FnMut(Ix) -> Option<Ix>) -> Option<Term> {
        let mut ok = true;
        let tm = walk(
            self,
            |c, i| {
                if i < c {
                    return Term::Var(i);
                }
                match f(i - c) {
                    Some(j) => Term::Var(j + c),
                    None => {
                        ok = false;
                        Term::Var(i)
                    }
                }
            },
            same_sort,
        );
        ok.then_some(tm)
    }

    pub fn has_var(&self, j: Ix) -> bool {
        self.any_var(|i| i == j)
    }

    /// Whether some free variable satisfies `f`.
    pub fn any_var(&self, mut f: impl FnMut(Ix) -> bool) -> bool {
        let mut found = false;
        walk(
            self,
            |c, i| {
                if i >= c && f(i - c) {
                    found = true;
                }
                Term::Var(i)
            },
            same_sort,
        );
        found
    }

    pub fn is_closed(&self) -> bool {
        !self.any_var(|_| true)
    }

    pub fn metas(&self) -> Vec<MetaId> {
        let mut ret = Vec::default();
        self.visit(&mut |t| {
            if let Term::Meta(m) = t {
                if !ret.contains(m) {
                    ret.push(*m)
                }
            }
        });
        ret
    }

    pub fn level_metas(&self) -> Vec<MetaId> {
        let mut ret = Vec::default();
        self.map_sorts(|s| {
            for l in [s.p, s.h] {
                if let Some(m) = l.meta_var() {
                    if !ret.contains(&m) {
                        ret.push(m)
                    }
                }
            }
            *s
        });
        ret
    }

    /// Calls `f` on every subterm, parents first.
    pub fn visit(&self, f: &mut impl FnMut(&Term)) {
        use Term::*;
        f(self);
        match self {
            Univ(_) | Var(_) | Ref(_, _) | Meta(_) | Nat | Zero | Interval | Left | Right => {}
            Lam(p, b) | Pi(p, b) | Sigma(p, b) => {
                p.typ.visit(f);
                b.visit(f)
            }
            Let(p, a, b) => {
                p.typ.visit(f);
                a.visit(f);
                b.visit(f)
            }
            App(a, b) | Pair(a, b) => {
                a.visit(f);
                b.visit(f)
            }
            Proj(a, _) | Field(a, _, _) | Suc(a) | PathLam(a) => a.visit(f),
            Data(_, _, ps) | ClassType(_, _, ps) => ps.iter().for_each(|t| t.visit(f)),
            Con(_, _, ps, xs) | New(_, _, ps, xs) => {
                ps.iter().for_each(|t| t.visit(f));
                xs.iter().for_each(|t| t.visit(f))
            }
            Case(cs) => {
                cs.scrut.visit(f);
                cs.motive.visit(f);
                cs.clauses.iter().for_each(|cl| cl.body.visit(f))
            }
            NatRec(r) => {
                let r: &crate::theory::abs::data::NatRec = r;
                for t in [&r.motive, &r.zero, &r.succ, &r.target] {
                    t.visit(f)
                }
            }
            Path(a, x, y) => {
                a.visit(f);
                x.visit(f);
                y.visit(f)
            }
            At(a) => {
                let a: &crate::theory::abs::data::At = a;
                for t in [&a.lhs, &a.rhs, &a.path, &a.point] {
                    t.visit(f)
                }
            }
        }
    }

    /// Global definitions referenced anywhere in the term.
    pub fn refs(&self, out: &mut Vec<crate::theory::Name>) {
        self.visit(&mut |t| {
            let n = match t {
                Term::Ref(n, _)
                | Term::Data(n, _, _)
                | Term::Con(n, _, _, _)
                | Term::ClassType(n, _, _)
                | Term::New(n, _, _, _)
                | Term::Field(_, n, _) => *n,
                Term::Case(cs) => {
                    for cl in &cs.clauses {
                        if let crate::theory::abs::data::ClauseHead::Con(c) = cl.head {
                            if !out.contains(&c) {
                                out.push(c)
                            }
                        }
                    }
                    return;
                }
                _ => return,
            };
            if !out.contains(&n) {
                out.push(n)
            }
        })
    }

    /// Replaces solved metavariables (and solved level metavariables) by
    /// their solutions, beta-reducing the spines they were applied to.
    pub fn zonk(
        &self,
        meta: &impl Fn(MetaId) -> Option<Term>,
        level: &impl Fn(MetaId) -> Option<Level>,
    ) -> Term {
        let tm = self.zonk_metas(meta);
        tm.map_sorts(|s| Sort::new(zonk_level(&s.p, level), zonk_level(&s.h, level)))
    }

    fn zonk_metas(&self, meta: &impl Fn(MetaId) -> Option<Term>) -> Term {
        if self.metas().into_iter().all(|m| meta(m).is_none()) {
            return self.clone();
        }
        maybe_grow(|| self.zonk_metas_impl(meta))
    }

    fn zonk_metas_impl(&self, meta: &impl Fn(MetaId) -> Option<Term>) -> Term {
        use Term::*;
        match self {
            App(_, _) => {
                let (head, args) = self.spine();
                let args = args
                    .into_iter()
                    .map(|a| a.zonk_metas(meta))
                    .collect::<Vec<_>>();
                match head {
                    Meta(m) => match meta(*m) {
                        Some(sol) => beta(sol.zonk_metas(meta), args),
                        None => Term::app(Meta(*m), args),
                    },
                    h => Term::app(h.zonk_metas(meta), args),
                }
            }
            Meta(m) => match meta(*m) {
                Some(sol) => sol.zonk_metas(meta),
                None => Meta(*m),
            },
            Lam(p, b) => Lam(zonk_param(p, meta), Box::new(b.zonk_metas(meta))),
            Pi(p, b) => Pi(zonk_param(p, meta), Box::new(b.zonk_metas(meta))),
            Sigma(p, b) => Sigma(zonk_param(p, meta), Box::new(b.zonk_metas(meta))),
            Let(p, a, b) => Let(
                zonk_param(p, meta),
                Box::new(a.zonk_metas(meta)),
                Box::new(b.zonk_metas(meta)),
            ),
            Pair(a, b) => Pair(Box::new(a.zonk_metas(meta)), Box::new(b.zonk_metas(meta))),
            Proj(a, s) => Proj(Box::new(a.zonk_metas(meta)), *s),
            Data(n, s, ps) => Data(*n, *s, zonk_all(ps, meta)),
            Con(n, s, ps, xs) => Con(*n, *s, zonk_all(ps, meta), zonk_all(xs, meta)),
            Case(cs) => Case(Box::new(crate::theory::abs::data::Case {
                scrut: cs.scrut.zonk_metas(meta),
                motive: cs.motive.zonk_metas(meta),
                clauses: cs
                    .clauses
                    .iter()
                    .map(|cl| Clause {
                        head: cl.head,
                        binders: cl.binders.clone(),
                        body: cl.body.zonk_metas(meta),
                    })
                    .collect(),
            })),
            ClassType(n, s, ps) => ClassType(*n, *s, zonk_all(ps, meta)),
            New(n, s, ps, fs) => New(*n, *s, zonk_all(ps, meta), zonk_all(fs, meta)),
            Field(a, n, i) => Field(Box::new(a.zonk_metas(meta)), *n, *i),
            Suc(a) => Suc(Box::new(a.zonk_metas(meta))),
            NatRec(r) => NatRec(Box::new(crate::theory::abs::data::NatRec {
                motive: r.motive.zonk_metas(meta),
                zero: r.zero.zonk_metas(meta),
                succ: r.succ.zonk_metas(meta),
                target: r.target.zonk_metas(meta),
            })),
            Path(a, x, y) => Path(
                Box::new(a.zonk_metas(meta)),
                Box::new(x.zonk_metas(meta)),
                Box::new(y.zonk_metas(meta)),
            ),
            PathLam(f) => PathLam(Box::new(f.zonk_metas(meta))),
            At(a) => At(Box::new(crate::theory::abs::data::At {
                lhs: a.lhs.zonk_metas(meta),
                rhs: a.rhs.zonk_metas(meta),
                path: a.path.zonk_metas(meta),
                point: a.point.zonk_metas(meta),
            })),
            tm => tm.clone(),
        }
    }
}

fn zonk_param(p: &Param<Term>, meta: &impl Fn(MetaId) -> Option<Term>) -> Param<Term> {
    Param {
        var: p.var.clone(),
        info: p.info,
        typ: Box::new(p.typ.zonk_metas(meta)),
    }
}

fn zonk_all(tms: &[Term], meta: &impl Fn(MetaId) -> Option<Term>) -> Vec<Term> {
    tms.iter().map(|t| t.zonk_metas(meta)).collect()
}

fn zonk_level(l: &Level, level: &impl Fn(MetaId) -> Option<Level>) -> Level {
    match l.meta_var() {
        Some(m) => match level(m) {
            Some(sol) => l.subst(crate::theory::abs::data::LevelVar::Meta(m), &sol),
            None => *l,
        },
        None => *l,
    }
}

/// Applies `f` to `args`, contracting the lambdas it starts with.
pub fn beta(f: Term, args: Vec<Term>) -> Term {
    let mut f = f;
    let mut rest = args.into_iter();
    loop {
        match f {
            Term::Lam(p, b) => match rest.next() {
                Some(x) => f = b.subst(&x),
                None => return Term::Lam(p, b),
            },
            f => return Term::app(f, rest),
        }
    }
}
