use std::collections::HashMap;

use log::trace;

use crate::theory::abs::data::{self, ClauseHead, Side, Sort, Term};
use crate::theory::abs::def::{Body, Env, Prim};
use crate::theory::abs::meta::Metas;
use crate::theory::{Loc, Name, Param};
use crate::{maybe_grow, Error};
use crate::Error::ReductionLimit;

/// Weak head normal forms of closed global applications.
pub type Memo = HashMap<Term, Term>;

pub struct Normalizer<'a> {
    sigma: Env<'a>,
    metas: &'a Metas,
    memo: &'a mut Memo,
    /// Values of the enclosing context entries, outermost first.
    locals: &'a [Option<Term>],
    /// Binders crossed below the context.
    depth: usize,
    fuel: usize,
    loc: Loc,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        sigma: Env<'a>,
        metas: &'a Metas,
        memo: &'a mut Memo,
        locals: &'a [Option<Term>],
        fuel: usize,
        loc: Loc,
    ) -> Self {
        Self {
            sigma,
            metas,
            memo,
            locals,
            depth: 0,
            fuel,
            loc,
        }
    }

    pub fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    fn step(&mut self) -> Result<(), Error> {
        if self.fuel == 0 {
            return Err(ReductionLimit(self.loc));
        }
        self.fuel -= 1;
        Ok(())
    }

    pub fn whnf(&mut self, tm: &Term) -> Result<Term, Error> {
        maybe_grow(move || self.whnf_impl(tm))
    }

    pub fn apply(&mut self, f: Term, args: &[Term]) -> Result<Term, Error> {
        self.whnf(&Term::app(f, args.iter().cloned()))
    }

    fn local(&self, i: usize) -> Option<Term> {
        let k = i.checked_sub(self.depth)?;
        let pos = self.locals.len().checked_sub(k + 1)?;
        self.locals[pos].as_ref().map(|v| v.lift(k + 1 + self.depth))
    }

    fn whnf_impl(&mut self, tm: &Term) -> Result<Term, Error> {
        use Term::*;
        Ok(match tm {
            Var(i) => match self.local(*i) {
                Some(v) => self.whnf(&v)?,
                None => Var(*i),
            },
            Meta(m) => match self.metas.solution(*m) {
                Some(sol) => self.whnf(&sol.clone())?,
                None => Meta(*m),
            },
            Ref(n, s) => self.delta(*n, s, Vec::default())?,
            App(_, _) => {
                let (head, args) = tm.clone().into_spine();
                let head = self.whnf(&head)?;
                self.spine(head, args)?
            }
            Let(_, a, b) => {
                self.step()?;
                self.whnf(&b.subst(a))?
            }
            Proj(a, side) => match self.whnf(a)? {
                Pair(x, y) => {
                    self.step()?;
                    match side {
                        Side::Fst => self.whnf(&x)?,
                        Side::Snd => self.whnf(&y)?,
                    }
                }
                a => Proj(Box::new(a), *side),
            },
            Field(a, c, i) => match self.whnf(a)? {
                New(_, _, _, fs) if *i < fs.len() => {
                    self.step()?;
                    self.whnf(&fs[*i])?
                }
                a => Field(Box::new(a), *c, *i),
            },
            Case(cs) => {
                let scrut = self.whnf(&cs.scrut)?;
                match self.iota(&scrut, &cs.clauses)? {
                    Some(tm) => tm,
                    None => Case(Box::new(data::Case {
                        scrut,
                        motive: cs.motive.clone(),
                        clauses: cs.clauses.clone(),
                    })),
                }
            }
            NatRec(r) => match self.whnf(&r.target)? {
                Zero => {
                    self.step()?;
                    self.whnf(&r.zero)?
                }
                Suc(n) => {
                    self.step()?;
                    let rec = NatRec(Box::new(data::NatRec {
                        motive: r.motive.clone(),
                        zero: r.zero.clone(),
                        succ: r.succ.clone(),
                        target: *n.clone(),
                    }));
                    self.apply(r.succ.clone(), &[*n, rec])?
                }
                target => NatRec(Box::new(data::NatRec {
                    motive: r.motive.clone(),
                    zero: r.zero.clone(),
                    succ: r.succ.clone(),
                    target,
                })),
            },
            At(a) => {
                let point = self.whnf(&a.point)?;
                match point {
                    Left => return self.whnf(&a.lhs),
                    Right => return self.whnf(&a.rhs),
                    _ => {}
                }
                match self.whnf(&a.path)? {
                    PathLam(f) => {
                        self.step()?;
                        self.apply(*f, &[point])?
                    }
                    path => At(Box::new(data::At {
                        lhs: a.lhs.clone(),
                        rhs: a.rhs.clone(),
                        path,
                        point,
                    })),
                }
            }
            tm => tm.clone(),
        })
    }

    fn spine(&mut self, head: Term, args: Vec<Term>) -> Result<Term, Error> {
        use Term::*;
        match head {
            Lam(_, b) if !args.is_empty() => {
                self.step()?;
                let mut args = args.into_iter();
                let Some(x) = args.next() else {
                    unreachable!()
                };
                let tm = Term::app(b.subst(&x), args);
                self.whnf(&tm)
            }
            Meta(m) => match self.metas.solution(m) {
                Some(sol) => {
                    let tm = Term::app(sol.clone(), args);
                    self.whnf(&tm)
                }
                None => Ok(Term::app(Meta(m), args)),
            },
            Ref(n, s) => self.delta(n, &s, args),
            head => Ok(Term::app(head, args)),
        }
    }

    /// Picks the clause matching a scrutinee in head normal form.
    fn iota(
        &mut self,
        scrut: &Term,
        clauses: &[data::Clause],
    ) -> Result<Option<Term>, Error> {
        let (head, args) = match scrut {
            Term::Con(n, _, _, xs) => (ClauseHead::Con(*n), xs.clone()),
            Term::Zero => (ClauseHead::Zero, Vec::default()),
            Term::Suc(n) => (ClauseHead::Suc, vec![*n.clone()]),
            _ => return Ok(None),
        };
        match clauses.iter().find(|cl| cl.head == head) {
            Some(cl) => {
                self.step()?;
                Ok(Some(self.whnf(&cl.body.subst_all(&args))?))
            }
            None => Ok(None),
        }
    }

    /// Unfolds a global applied to `args`, or puts it into its canonical
    /// form. Functions blocked on a case split stay folded.
    fn delta(&mut self, n: Name, s: &Sort, mut args: Vec<Term>) -> Result<Term, Error> {
        use Body::*;
        let folded = |args: Vec<Term>| Term::app(Term::Ref(n, *s), args);
        let sigma = self.sigma;
        let Some(d) = sigma.get(&n) else {
            return Ok(folded(args));
        };
        let arity = d.tele.len();
        if args.len() < arity {
            return Ok(folded(args));
        }
        let rest = args.split_off(arity);
        let tm = match &d.body {
            Body::Prim(p) => {
                let tm = prim(*p, args);
                return self.whnf(&Term::app(tm, rest));
            }
            Fn { body, .. } => {
                let key = folded(args.clone());
                let memoizable = key.is_closed() && key.metas().is_empty();
                let hit = if memoizable {
                    self.memo.get(&key).cloned()
                } else {
                    None
                };
                match hit {
                    Some(tm) => tm,
                    None => {
                        self.step()?;
                        let unfolded = body.subst_levels(s).subst_all(&args);
                        let tm = self.whnf(&unfolded)?;
                        if is_stuck(&tm) {
                            trace!(target: "normalize", "stuck: {n}");
                            return Ok(Term::app(key, rest));
                        }
                        if memoizable {
                            self.memo.insert(key, tm.clone());
                        }
                        tm
                    }
                }
            }
            Data { .. } => Term::Data(n, *s, args),
            Ctor { params, .. } => {
                let xs = args.split_off(*params);
                Term::Con(n, *s, args, xs)
            }
            Class { .. } => Term::ClassType(n, *s, args),
            Field { class, index } => {
                let Some(inst) = args.pop() else {
                    return Ok(folded(args));
                };
                Term::Field(Box::new(inst), *class, *index)
            }
            Instance { body, .. } => {
                self.step()?;
                body.subst_levels(s).subst_all(&args)
            }
            Undefined => return Ok(Term::app(folded(args), rest)),
        };
        if rest.is_empty() {
            self.whnf(&tm)
        } else {
            self.whnf(&Term::app(tm, rest))
        }
    }

    pub fn nf(&mut self, tm: &Term) -> Result<Term, Error> {
        maybe_grow(move || self.nf_impl(tm))
    }

    fn under<R>(&mut self, n: usize, f: impl FnOnce(&mut Self) -> R) -> R {
        self.depth += n;
        let ret = f(self);
        self.depth -= n;
        ret
    }

    fn nf_box(&mut self, tm: &Term) -> Result<Box<Term>, Error> {
        Ok(Box::new(self.nf(tm)?))
    }

    fn nf_all(&mut self, tms: &[Term]) -> Result<Vec<Term>, Error> {
        tms.iter().map(|t| self.nf(t)).collect()
    }

    fn nf_param(&mut self, p: &Param<Term>) -> Result<Param<Term>, Error> {
        Ok(Param {
            var: p.var.clone(),
            info: p.info,
            typ: self.nf_box(&p.typ)?,
        })
    }

    fn nf_impl(&mut self, tm: &Term) -> Result<Term, Error> {
        use Term::*;
        Ok(match self.whnf(tm)? {
            Lam(p, b) => Lam(self.nf_param(&p)?, self.under(1, |s| s.nf_box(&b))?),
            Pi(p, b) => Pi(self.nf_param(&p)?, self.under(1, |s| s.nf_box(&b))?),
            Sigma(p, b) => Sigma(self.nf_param(&p)?, self.under(1, |s| s.nf_box(&b))?),
            App(f, x) => App(self.nf_spine_head(&f)?, self.nf_box(&x)?),
            Pair(a, b) => Pair(self.nf_box(&a)?, self.nf_box(&b)?),
            Proj(a, s) => Proj(self.nf_box(&a)?, s),
            Data(n, s, ps) => Data(n, s, self.nf_all(&ps)?),
            Con(n, s, ps, xs) => Con(n, s, self.nf_all(&ps)?, self.nf_all(&xs)?),
            ClassType(n, s, ps) => ClassType(n, s, self.nf_all(&ps)?),
            New(n, s, ps, fs) => New(n, s, self.nf_all(&ps)?, self.nf_all(&fs)?),
            Field(a, c, i) => Field(self.nf_box(&a)?, c, i),
            Suc(a) => Suc(self.nf_box(&a)?),
            Case(cs) => {
                let scrut = self.nf(&cs.scrut)?;
                let motive = self.under(1, |s| s.nf(&cs.motive))?;
                let mut clauses = Vec::with_capacity(cs.clauses.len());
                for cl in &cs.clauses {
                    let body = self.under(cl.arity(), |s| s.nf(&cl.body))?;
                    clauses.push(data::Clause {
                        head: cl.head,
                        binders: cl.binders.clone(),
                        body,
                    })
                }
                Case(Box::new(data::Case {
                    scrut,
                    motive,
                    clauses,
                }))
            }
            NatRec(r) => NatRec(Box::new(data::NatRec {
                motive: self.nf(&r.motive)?,
                zero: self.nf(&r.zero)?,
                succ: self.nf(&r.succ)?,
                target: self.nf(&r.target)?,
            })),
            Path(a, x, y) => Path(self.nf_box(&a)?, self.nf_box(&x)?, self.nf_box(&y)?),
            PathLam(f) => PathLam(self.nf_box(&f)?),
            At(a) => At(Box::new(data::At {
                lhs: self.nf(&a.lhs)?,
                rhs: self.nf(&a.rhs)?,
                path: self.nf(&a.path)?,
                point: self.nf(&a.point)?,
            })),
            tm => tm,
        })
    }

    /// Normalizes the function part of a neutral application without
    /// unfolding it again.
    fn nf_spine_head(&mut self, f: &Term) -> Result<Box<Term>, Error> {
        match f {
            Term::App(g, x) => Ok(Box::new(Term::App(
                self.nf_spine_head(g)?,
                self.nf_box(x)?,
            ))),
            Term::Ref(n, s) => Ok(Box::new(Term::Ref(*n, *s))),
            f => self.nf_box(f),
        }
    }
}

fn prim(p: Prim, args: Vec<Term>) -> Term {
    use Prim::*;
    let mut args = args.into_iter();
    let mut next = || args.next().unwrap_or(Term::Zero);
    match p {
        Prim::Nat => Term::Nat,
        Prim::Zero => Term::Zero,
        Prim::Suc => Term::Suc(Box::new(next())),
        Prim::NatRec => {
            let motive = next();
            let zero = next();
            let succ = next();
            let target = next();
            Term::NatRec(Box::new(data::NatRec {
                motive,
                zero,
                succ,
                target,
            }))
        }
        Interval => Term::Interval,
        Left => Term::Left,
        Right => Term::Right,
        Prim::Path => {
            let a = next();
            let x = next();
            let y = next();
            Term::Path(Box::new(a), Box::new(x), Box::new(y))
        }
        PathLam => {
            next();
            Term::PathLam(Box::new(next()))
        }
        Prim::At => {
            next();
            let lhs = next();
            let rhs = next();
            let path = next();
            let point = next();
            Term::At(Box::new(data::At {
                lhs,
                rhs,
                path,
                point,
            }))
        }
    }
}

/// Whether a function's unfolding is blocked on a case split.
fn is_stuck(tm: &Term) -> bool {
    matches!(tm.spine().0, Term::Case(_) | Term::NatRec(_))
}
