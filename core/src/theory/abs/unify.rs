use std::iter::repeat;

use log::trace;

use crate::config::Config;
use crate::theory::abs::data::{self, MetaId, Side, Sort, Term};
use crate::theory::abs::def::Env;
use crate::theory::abs::meta::{Cmp, Constraint, Metas};
use crate::theory::abs::normalize::{Memo, Normalizer};
use crate::theory::{LocalVar, Loc, Param, ParamInfo};
use crate::Error::{ReductionLimit, TypeMismatch};
use crate::{maybe_grow, Error};

pub struct Unifier<'a> {
    sigma: Env<'a>,
    metas: &'a mut Metas,
    memo: &'a mut Memo,
    locals: &'a [Option<Term>],
    config: &'a Config,
    loc: Loc,
    binders: usize,
    depth: usize,
}

impl<'a> Unifier<'a> {
    pub fn new(
        sigma: Env<'a>,
        metas: &'a mut Metas,
        memo: &'a mut Memo,
        locals: &'a [Option<Term>],
        config: &'a Config,
        loc: Loc,
    ) -> Self {
        Self {
            sigma,
            metas,
            memo,
            locals,
            config,
            loc,
            binders: 0,
            depth: 0,
        }
    }

    fn unify_err(&self, lhs: &Term, rhs: &Term) -> Result<(), Error> {
        Err(TypeMismatch {
            expected: rhs.to_string(),
            actual: lhs.to_string(),
            loc: self.loc,
        })
    }

    fn nf(&mut self) -> Normalizer {
        Normalizer::new(
            self.sigma,
            &*self.metas,
            &mut *self.memo,
            self.locals,
            self.config.reduction_fuel,
            self.loc,
        )
        .at_depth(self.binders)
    }

    fn whnf(&mut self, tm: &Term) -> Result<Term, Error> {
        self.nf().whnf(tm)
    }

    pub fn unify(&mut self, lhs: &Term, rhs: &Term) -> Result<(), Error> {
        self.unify_cmp(lhs, rhs, Cmp::Eq)
    }

    /// `lhs` is usable where `rhs` is expected, up to universe cumulativity.
    pub fn subtype(&mut self, lhs: &Term, rhs: &Term) -> Result<(), Error> {
        self.unify_cmp(lhs, rhs, Cmp::Le)
    }

    pub fn unify_cmp(&mut self, lhs: &Term, rhs: &Term, cmp: Cmp) -> Result<(), Error> {
        if lhs == rhs {
            return Ok(());
        }
        if self.depth >= self.config.conversion_depth {
            return Err(ReductionLimit(self.loc));
        }
        self.depth += 1;
        let ret = maybe_grow(|| self.unify_impl(lhs, rhs, cmp));
        self.depth -= 1;
        ret
    }

    fn under<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.binders += 1;
        let ret = f(self);
        self.binders -= 1;
        ret
    }

    fn unsolved_head(&self, tm: &Term) -> Option<MetaId> {
        tm.is_meta_headed()
            .filter(|m| self.metas.solution(*m).is_none())
    }

    fn unify_impl(&mut self, lhs: &Term, rhs: &Term, cmp: Cmp) -> Result<(), Error> {
        use Term::*;

        let l = self.whnf(lhs)?;
        let r = self.whnf(rhs)?;
        if l == r {
            return Ok(());
        }
        trace!(target: "unify", "{l} ~ {r}");

        if let Some(m) = self.unsolved_head(&l) {
            return self.solve(m, &l, &r, cmp);
        }
        if let Some(m) = self.unsolved_head(&r) {
            return self.solve(m, &r, &l, cmp);
        }

        match (&l, &r) {
            (Univ(a), Univ(b)) => self.sorts(a, b, cmp),
            (Var(i), Var(j)) if i == j => Ok(()),
            (Ref(n, s), Ref(m, t)) if n == m => self.sorts(s, t, Cmp::Eq),

            (Pi(p, a), Pi(q, b)) if p.info == q.info => {
                self.unify(&p.typ, &q.typ)?;
                self.under(|u| u.unify_cmp(a, b, cmp))
            }
            (Sigma(p, a), Sigma(q, b)) => {
                self.unify_cmp(&p.typ, &q.typ, cmp)?;
                self.under(|u| u.unify_cmp(a, b, cmp))
            }

            (Lam(_, a), Lam(_, b)) => self.under(|u| u.unify(a, b)),
            (Lam(_, a), r) => {
                let r = Self::eta_app(r);
                self.under(|u| u.unify(a, &r))
            }
            (l, Lam(_, b)) => {
                let l = Self::eta_app(l);
                self.under(|u| u.unify(&l, b))
            }

            (Pair(a, b), Pair(x, y)) => {
                self.unify(a, x)?;
                self.unify(b, y)
            }
            (Pair(a, b), r) => {
                self.unify(a, &Proj(Box::new(r.clone()), Side::Fst))?;
                self.unify(b, &Proj(Box::new(r.clone()), Side::Snd))
            }
            (l, Pair(x, y)) => {
                self.unify(&Proj(Box::new(l.clone()), Side::Fst), x)?;
                self.unify(&Proj(Box::new(l.clone()), Side::Snd), y)
            }

            (New(c, _, _, fs), New(d, _, _, gs)) if c == d && fs.len() == gs.len() => {
                self.all(fs, gs)
            }
            (New(c, _, _, fs), r) => {
                for (i, f) in fs.iter().enumerate() {
                    self.unify(f, &Field(Box::new(r.clone()), *c, i))?;
                }
                Ok(())
            }
            (l, New(c, _, _, gs)) => {
                for (i, g) in gs.iter().enumerate() {
                    self.unify(&Field(Box::new(l.clone()), *c, i), g)?;
                }
                Ok(())
            }

            (PathLam(f), PathLam(g)) => self.unify(f, g),
            (PathLam(f), r) => {
                let (a, b) = Self::eta_path(f, r);
                self.under(|u| u.unify(&a, &b))
            }
            (l, PathLam(g)) => {
                let (b, a) = Self::eta_path(g, l);
                self.under(|u| u.unify(&a, &b))
            }

            (Data(n, s, ps), Data(m, t, qs)) | (ClassType(n, s, ps), ClassType(m, t, qs))
                if n == m =>
            {
                self.sorts(s, t, cmp)?;
                self.all(ps, qs)
            }
            (Con(n, _, _, xs), Con(m, _, _, ys)) if n == m => self.all(xs, ys),
            (Suc(a), Suc(b)) => self.unify(a, b),
            (Proj(a, s), Proj(b, t)) if s == t => self.unify(a, b),
            (Field(a, c, i), Field(b, d, j)) if c == d && i == j => self.unify(a, b),
            (Path(a, x, y), Path(b, u, v)) => {
                self.unify(a, b)?;
                self.unify(x, u)?;
                self.unify(y, v)
            }
            (At(a), At(b)) => {
                self.unify(&a.path, &b.path)?;
                self.unify(&a.point, &b.point)
            }
            (NatRec(a), NatRec(b)) => {
                self.unify(&a.target, &b.target)?;
                self.unify(&a.zero, &b.zero)?;
                self.unify(&a.succ, &b.succ)
            }
            (Case(a), Case(b)) if a.clauses.len() == b.clauses.len() => {
                self.unify(&a.scrut, &b.scrut)?;
                for (x, y) in a.clauses.iter().zip(&b.clauses) {
                    if x.head != y.head || x.arity() != y.arity() {
                        return self.unify_err(&l, &r);
                    }
                    self.binders += x.arity();
                    let ret = self.unify(&x.body, &y.body);
                    self.binders -= x.arity();
                    ret?;
                }
                Ok(())
            }
            (App(f, x), App(g, y)) => {
                self.unify(f, g)?;
                self.unify(x, y)
            }

            _ => self.unify_err(&l, &r),
        }
    }

    fn all(&mut self, xs: &[Term], ys: &[Term]) -> Result<(), Error> {
        if xs.len() != ys.len() {
            return Err(TypeMismatch {
                expected: format!("{} arguments", ys.len()),
                actual: format!("{} arguments", xs.len()),
                loc: self.loc,
            });
        }
        for (x, y) in xs.iter().zip(ys) {
            self.unify(x, y)?;
        }
        Ok(())
    }

    /// `t` applied to the variable of one new binder.
    fn eta_app(t: &Term) -> Term {
        Term::App(Box::new(t.lift(1)), Box::new(Term::Var(0)))
    }

    /// Both sides of `path f = p` under one interval binder.
    fn eta_path(f: &Term, p: &Term) -> (Term, Term) {
        let f = f.lift(1);
        let at = Term::At(Box::new(data::At {
            lhs: Term::App(Box::new(f.clone()), Box::new(Term::Left)),
            rhs: Term::App(Box::new(f.clone()), Box::new(Term::Right)),
            path: p.lift(1),
            point: Term::Var(0),
        }));
        (Term::App(Box::new(f), Box::new(Term::Var(0))), at)
    }

    fn sorts(&mut self, a: &Sort, b: &Sort, cmp: Cmp) -> Result<(), Error> {
        let loc = self.loc;
        match cmp {
            Cmp::Eq => {
                self.metas.p.add_eq(&a.p, &b.p, loc)?;
                self.metas.h.add_eq(&a.h, &b.h, loc)
            }
            Cmp::Le => {
                self.metas.p.add_le(&a.p, &b.p, loc)?;
                self.metas.h.add_le(&a.h, &b.h, loc)
            }
        }
    }

    fn defer(&mut self, lhs: &Term, rhs: &Term, cmp: Cmp) -> Result<(), Error> {
        trace!(target: "unify", "deferred: {lhs} ~ {rhs}");
        let locals = self
            .locals
            .iter()
            .cloned()
            .chain(repeat(None).take(self.binders))
            .collect();
        self.metas.constraints.push(Constraint {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            cmp,
            locals,
            loc: self.loc,
        });
        Ok(())
    }

    /// Solves `?m x1 .. xn = rhs` when the `xi` are distinct variables, and
    /// defers anything else.
    fn solve(&mut self, m: MetaId, lhs: &Term, rhs: &Term, cmp: Cmp) -> Result<(), Error> {
        let (_, spine) = lhs.clone().into_spine();
        let mut vars = Vec::with_capacity(spine.len());
        for a in &spine {
            // Let-bound variables count as variables here, not as their values.
            let a = match a {
                Term::Var(i) => Term::Var(*i),
                a => self.whnf(a)?,
            };
            match a {
                Term::Var(i) if !vars.contains(&i) => vars.push(i),
                _ => return self.defer(lhs, rhs, cmp),
            }
        }

        let rhs = self.metas.zonk(rhs);
        if rhs.metas().contains(&m) {
            return self.unify_err(lhs, &rhs);
        }

        let n = vars.len();
        let rename = |tm: &Term| {
            tm.rename_free(|i| vars.iter().position(|v| *v == i).map(|j| n - 1 - j))
        };
        let body = match rename(&rhs) {
            Some(body) => body,
            None => {
                let rhs = self.nf().nf(&rhs)?;
                match rename(&rhs) {
                    Some(body) => body,
                    None => return self.defer(lhs, &rhs, cmp),
                }
            }
        };

        let sol = self.abstract_spine(m, body, n);
        trace!(target: "unify", "?{m} := {sol}");
        self.metas.solve(m, sol);
        Ok(())
    }

    /// Wraps `body` in `n` lambdas, contracting the innermost ones where the
    /// body is an eta-redex.
    fn abstract_spine(&self, m: MetaId, mut body: Term, n: usize) -> Term {
        let mut k = n;
        while k > 0 {
            match &body {
                Term::App(f, x) if **x == Term::Var(0) && !f.has_var(0) => {
                    body = f.shift(-1, 0);
                    k -= 1;
                }
                _ => break,
            }
        }
        let mut tele = Vec::with_capacity(k);
        let mut typ = &self.metas.get(m).typ;
        for _ in 0..k {
            match typ {
                Term::Pi(p, b) => {
                    tele.push(p.clone());
                    typ = b;
                }
                _ => tele.push(Param::new(
                    LocalVar::hint("x"),
                    ParamInfo::Explicit,
                    Term::Univ(Sort::set0()),
                )),
            }
        }
        Term::lam(&tele, body)
    }
}

/// Retries deferred constraints until no more progress is made. Returns
/// whether any constraint was discharged.
pub fn retry_constraints(
    sigma: Env,
    metas: &mut Metas,
    memo: &mut Memo,
    config: &Config,
) -> Result<bool, Error> {
    let mut progress = false;
    loop {
        let pending = std::mem::take(&mut metas.constraints);
        if pending.is_empty() {
            break;
        }
        let before = (pending.len(), metas.unsolved().count());
        for c in pending {
            Unifier::new(sigma, metas, memo, &c.locals, config, c.loc)
                .unify_cmp(&c.lhs, &c.rhs, c.cmp)?;
        }
        let after = (metas.constraints.len(), metas.unsolved().count());
        if after.0 < before.0 || after.1 < before.1 {
            progress = true;
        } else {
            break;
        }
    }
    Ok(progress)
}
