use crate::theory::abs::builtin::prim_name;
use crate::theory::abs::data::{self, ClauseHead, Sort, Term};
use crate::theory::abs::def::{Body, Env};
use crate::theory::conc::data::{Clause, Expr, Pattern};
use crate::theory::conc::elab::Elaborator;
use crate::theory::{short_name, Loc, LocalVar, Name, Param, ParamInfo, Tele};
use crate::Error::{NonExhaustiveMatch, TypeMismatch};
use crate::{Error, Warning};

/// A clause still being matched: its remaining patterns, one per column, and
/// the pattern variables bound so far.
struct Row {
    index: usize,
    pats: Vec<Pattern>,
    binds: Vec<(LocalVar, Term, Term, usize)>,
}

struct Matcher<'c> {
    clauses: &'c [Clause],
    used: Vec<bool>,
    missing: Vec<String>,
}

/// A constructor of a split column's type, with its argument telescope
/// instantiated at the column's type arguments.
struct Head {
    head: ClauseHead,
    name: Name,
    args: Tele<Term>,
    /// Level and parameters of the data type.
    data: Option<(Sort, Vec<Term>)>,
}

fn unpi(mut tm: Term, n: usize) -> Tele<Term> {
    let mut ret = Tele::default();
    for _ in 0..n {
        match tm {
            Term::Pi(p, b) => {
                ret.push(p);
                tm = *b;
            }
            _ => break,
        }
    }
    ret
}

fn wildcards(loc: Loc, n: usize) -> Vec<Pattern> {
    (0..n)
        .map(|_| Pattern::Var(loc, LocalVar::unbound()))
        .collect()
}

fn is_named(v: &LocalVar) -> bool {
    v.as_str() != "_"
}

impl Elaborator<'_> {
    /// Compiles clauses over the given scrutinee columns (terms and their
    /// types) into a case tree returning `goal`.
    pub(super) fn clauses(
        &mut self,
        clauses: &[Clause],
        cols: Vec<(Term, Term)>,
        goal: &Term,
        loc: Loc,
    ) -> Result<Term, Error> {
        let mut rows = Vec::with_capacity(clauses.len());
        for (index, c) in clauses.iter().enumerate() {
            if c.pats.len() != cols.len() {
                return Err(TypeMismatch {
                    expected: format!("{} patterns", cols.len()),
                    actual: format!("{} patterns", c.pats.len()),
                    loc: c.loc,
                });
            }
            rows.push(Row {
                index,
                pats: c.pats.clone(),
                binds: Default::default(),
            });
        }
        let mut m = Matcher {
            clauses,
            used: vec![false; clauses.len()],
            missing: Default::default(),
        };
        let tm = self.split(&mut m, rows, cols, goal, loc)?;
        match tm {
            Some(tm) if m.missing.is_empty() => {
                for (c, used) in clauses.iter().zip(m.used) {
                    if !used {
                        self.warnings.push(Warning::RedundantClause(c.loc));
                    }
                }
                Ok(tm)
            }
            _ => Err(NonExhaustiveMatch {
                missing: m.missing,
                loc,
            }),
        }
    }

    /// `\case e \as x \return T \with { ... }`. Without a return type the
    /// expected type is used, or a fresh one when inferring.
    pub(super) fn case(
        &mut self,
        scrut: &Expr,
        var: &LocalVar,
        ret: Option<&Expr>,
        clauses: &[Clause],
        expected: Option<&Term>,
        loc: Loc,
    ) -> Result<(Term, Term), Error> {
        let (s, sty) = self.infer(scrut)?;
        let outer = match (ret, expected) {
            (Some(_), _) => None,
            (None, Some(t)) => Some(t.clone()),
            (None, None) => Some(self.fresh_type(loc)),
        };
        self.push(var.clone(), ParamInfo::Explicit, sty.clone(), None);
        let body = self.case_body(ret, outer.as_ref(), &sty, clauses, loc);
        self.pop(1);
        let (body, goal) = body?;
        let ty = goal.subst(&s);
        if let (Some(_), Some(e)) = (ret, expected) {
            self.subtype(&ty, e, loc)?;
        }
        Ok((body.subst(&s), ty))
    }

    fn case_body(
        &mut self,
        ret: Option<&Expr>,
        outer: Option<&Term>,
        sty: &Term,
        clauses: &[Clause],
        loc: Loc,
    ) -> Result<(Term, Term), Error> {
        let goal = match (ret, outer) {
            (Some(r), _) => self.infer_type(r)?.0,
            (None, Some(t)) => t.lift(1),
            (None, None) => self.fresh_type(loc),
        };
        let body = self.clauses(clauses, vec![(Term::Var(0), sty.lift(1))], &goal, loc)?;
        Ok((body, goal))
    }

    /// Constructors of `ty`, or `None` when it cannot be split.
    fn heads(&mut self, ty: &Term, loc: Loc) -> Result<Option<Vec<Head>>, Error> {
        Ok(Some(match self.whnf(ty, loc)? {
            Term::Nat => vec![
                Head {
                    head: ClauseHead::Zero,
                    name: prim_name("zero"),
                    args: Default::default(),
                    data: None,
                },
                Head {
                    head: ClauseHead::Suc,
                    name: prim_name("suc"),
                    args: vec![Param::new(LocalVar::hint("n"), ParamInfo::Explicit, Term::Nat)],
                    data: None,
                },
            ],
            Term::Data(d, s, args) => {
                let env = Env::new(self.base, &self.own);
                let Some(Body::Data { ctors }) = env.get(&d).map(|d| &d.body) else {
                    return Ok(None);
                };
                let ctors = ctors
                    .iter()
                    .filter_map(|c| env.get(c).cloned())
                    .collect::<Vec<_>>();
                let mut heads = Vec::with_capacity(ctors.len());
                for c in ctors {
                    let Body::Ctor { params, pats, .. } = &c.body else {
                        continue;
                    };
                    let np = (*params).min(c.tele.len());
                    let inst = match pats {
                        None => args.clone(),
                        Some(pats) => {
                            match self.match_indices(&d, pats, &args, np, &s, loc)? {
                                Some(inst) => inst,
                                None => continue,
                            }
                        }
                    };
                    let pi = Term::pi(&c.tele[np..].to_vec(), Term::Nat)
                        .subst_levels(&s)
                        .subst_all(&inst);
                    heads.push(Head {
                        head: ClauseHead::Con(c.name),
                        name: c.name,
                        args: unpi(pi, c.tele.len() - np),
                        data: Some((s, inst)),
                    });
                }
                heads
            }
            _ => return Ok(None),
        }))
    }

    /// Values of a guarded constructor's pattern variables at the type
    /// arguments `args`, or `None` when it builds a different instance.
    fn match_indices(
        &mut self,
        data: &Name,
        pats: &[Term],
        args: &[Term],
        n: usize,
        s: &Sort,
        loc: Loc,
    ) -> Result<Option<Vec<Term>>, Error> {
        let mut out = vec![None; n];
        for (p, a) in pats.iter().zip(args) {
            if !self.match_index(data, &p.subst_levels(s), a, &mut out, loc)? {
                return Ok(None);
            }
        }
        Ok(out.into_iter().collect())
    }

    fn match_index(
        &mut self,
        data: &Name,
        pat: &Term,
        arg: &Term,
        out: &mut [Option<Term>],
        loc: Loc,
    ) -> Result<bool, Error> {
        if let Term::Var(i) = pat {
            let n = out.len();
            out[n - 1 - i] = Some(arg.clone());
            return Ok(true);
        }
        let arg = self.whnf(arg, loc)?;
        match (pat, &arg) {
            (Term::Zero, Term::Zero) => Ok(true),
            (Term::Suc(p), Term::Suc(a)) => self.match_index(data, p, a, out, loc),
            (Term::Con(c, _, _, ps), Term::Con(e, _, _, xs)) if c == e => {
                for (p, x) in ps.iter().zip(xs) {
                    if !self.match_index(data, p, x, out, loc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (_, Term::Zero | Term::Suc(_) | Term::Con(..)) => Ok(false),
            _ => Err(TypeMismatch {
                expected: format!("a constructor in the index of {}", short_name(data)),
                actual: self.show(&arg),
                loc,
            }),
        }
    }

    /// Elaborates the patterns guarding a constructor against the data
    /// telescope, binding pattern variables as implicit context entries.
    /// Gives one index term per data parameter.
    pub(super) fn index_patterns(
        &mut self,
        pats: &[Pattern],
        tele: &Tele<Term>,
    ) -> Result<Vec<Term>, Error> {
        let mut idx = Vec::with_capacity(pats.len());
        for (p, param) in pats.iter().zip(tele) {
            let ty = param.typ.subst_all(&idx);
            self.index_pattern(p, &ty, &mut idx)?;
        }
        Ok(idx)
    }

    fn index_pattern(&mut self, p: &Pattern, ty: &Term, acc: &mut Vec<Term>) -> Result<(), Error> {
        match p {
            Pattern::Var(_, v) => {
                self.push(v.clone(), ParamInfo::Implicit, ty.clone(), None);
                for t in acc.iter_mut() {
                    *t = t.lift(1);
                }
                acc.push(Term::Var(0));
            }
            Pattern::Num(loc, n) => {
                self.unify(ty, &Term::Nat, *loc)?;
                acc.push(Term::nat(*n));
            }
            Pattern::Con(loc, c, ps) => {
                let start = self.ctx.len();
                let head = self
                    .heads(ty, *loc)?
                    .and_then(|hs| hs.into_iter().find(|h| h.name == *c));
                let Some(h) = head else {
                    return Err(TypeMismatch {
                        expected: self.show(ty),
                        actual: short_name(c).to_string(),
                        loc: *loc,
                    });
                };
                if ps.len() != h.args.len() {
                    return Err(TypeMismatch {
                        expected: format!("{} arguments to {}", h.args.len(), short_name(c)),
                        actual: format!("{} arguments", ps.len()),
                        loc: *loc,
                    });
                }
                let mark = acc.len();
                for (a, (q, arg)) in ps.iter().zip(&h.args).enumerate() {
                    let bound = self.ctx.len() - start;
                    let ty = arg.typ.shift(bound as isize, a).subst_all(&acc[mark..]);
                    self.index_pattern(q, &ty, acc)?;
                }
                let bound = self.ctx.len() - start;
                let mut xs = acc.split_off(mark);
                acc.push(match (h.head, h.data) {
                    (ClauseHead::Con(c), Some((s, params))) => Term::Con(
                        c,
                        s,
                        params.iter().map(|t| t.lift(bound)).collect(),
                        xs,
                    ),
                    (ClauseHead::Suc, _) => Term::Suc(Box::new(xs.remove(0))),
                    _ => Term::Zero,
                });
            }
            Pattern::Absurd(loc) | Pattern::Unresolved(loc, ..) => {
                return Err(TypeMismatch {
                    expected: "an index pattern".to_string(),
                    actual: p.to_string(),
                    loc: *loc,
                })
            }
        }
        Ok(())
    }

    fn split(
        &mut self,
        m: &mut Matcher,
        mut rows: Vec<Row>,
        cols: Vec<(Term, Term)>,
        goal: &Term,
        loc: Loc,
    ) -> Result<Option<Term>, Error> {
        if rows.is_empty() {
            // Only a column of an empty type can be covered by no clauses.
            for (scrut, sty) in &cols {
                if let Ok(Some(hs)) = self.heads(sty, loc) {
                    if hs.is_empty() {
                        return Ok(Some(empty_case(scrut.clone(), goal)));
                    }
                }
            }
            m.missing.push("_".to_string());
            return Ok(None);
        }
        let Some(j) = rows[0]
            .pats
            .iter()
            .position(|p| !matches!(p, Pattern::Var(..)))
        else {
            return self.leaf(m, rows.swap_remove(0), cols, goal).map(Some);
        };

        let (scrut, sty) = cols[j].clone();
        let at = rows[0].pats[j].loc();
        let Some(heads) = self.heads(&sty, at)? else {
            return Err(TypeMismatch {
                expected: "a data type".to_string(),
                actual: self.show(&sty),
                loc: at,
            });
        };
        if heads.is_empty() {
            m.used[rows[0].index] = true;
            return Ok(Some(empty_case(scrut, goal)));
        }
        let is_nat = matches!(heads[0].head, ClauseHead::Zero);
        for r in &rows {
            match &r.pats[j] {
                Pattern::Absurd(l) => {
                    return Err(TypeMismatch {
                        expected: "an empty type".to_string(),
                        actual: self.show(&sty),
                        loc: *l,
                    })
                }
                Pattern::Con(l, c, _) if !heads.iter().any(|h| h.name == *c) => {
                    return Err(TypeMismatch {
                        expected: self.show(&sty),
                        actual: short_name(c).to_string(),
                        loc: *l,
                    })
                }
                Pattern::Num(l, _) if !is_nat => {
                    return Err(TypeMismatch {
                        expected: self.show(&sty),
                        actual: "Nat".to_string(),
                        loc: *l,
                    })
                }
                Pattern::Unresolved(l, n, _) => {
                    return Err(Error::UnresolvedName(n.to_string(), *l))
                }
                _ => {}
            }
        }

        let motive = match scrut {
            Term::Var(i) => goal.abstract_var(i),
            _ => goal.lift(1),
        };
        let mut clauses = Vec::default();
        for h in heads {
            let k = h.args.len();
            let binders = self.binder_names(&rows, j, &h);
            for (a, n) in h.args.iter().zip(&binders) {
                self.push(LocalVar::hint(n), a.info, *a.typ.clone(), None);
            }
            let con = match (&h.head, &h.data) {
                (ClauseHead::Zero, _) => Term::Zero,
                (ClauseHead::Suc, _) => Term::Suc(Box::new(Term::Var(0))),
                (ClauseHead::Con(c), data) => {
                    let (s, ps) = data.clone().unwrap_or_default();
                    Term::Con(
                        *c,
                        s,
                        ps.iter().map(|p| p.lift(k)).collect(),
                        (0..k).rev().map(Term::Var).collect(),
                    )
                }
            };
            let refine = |t: &Term| match scrut {
                Term::Var(i) => t.abstract_var(i).shift(k as isize, 1).subst(&con),
                _ => t.lift(k),
            };
            let len = self.ctx.len();
            let mut sub = Vec::default();
            for r in &rows {
                let Some(args) = specialize(&r.pats[j], &h, k)? else {
                    continue;
                };
                let mut binds = r.binds.clone();
                if let Pattern::Var(_, v) = &r.pats[j] {
                    if is_named(v) {
                        binds.push((v.clone(), con.clone(), sty.lift(k), len));
                    }
                }
                let mut pats = r.pats[..j].to_vec();
                pats.extend(args);
                pats.extend(r.pats[j + 1..].iter().cloned());
                sub.push(Row {
                    index: r.index,
                    pats,
                    binds,
                });
            }
            let mut sub_cols = cols[..j]
                .iter()
                .map(|(t, ty)| (t.lift(k), refine(ty)))
                .collect::<Vec<_>>();
            sub_cols.extend(
                h.args
                    .iter()
                    .enumerate()
                    .map(|(a, p)| (Term::Var(k - 1 - a), p.typ.lift(k - a))),
            );
            sub_cols.extend(cols[j + 1..].iter().map(|(t, ty)| (t.lift(k), refine(ty))));
            let branch_goal = refine(goal);

            let body = if sub.is_empty() {
                m.missing.push(short_name(&h.name).to_string());
                Ok(None)
            } else {
                self.split(m, sub, sub_cols, &branch_goal, loc)
            };
            self.pop(k);
            if let Some(body) = body? {
                clauses.push(data::Clause {
                    head: h.head,
                    binders: binders.into_iter().map(|n| n.as_str().into()).collect(),
                    body,
                });
            }
        }
        Ok(Some(Term::Case(Box::new(data::Case {
            scrut,
            motive,
            clauses,
        }))))
    }

    /// Binder names of a constructor branch, taken from the first clause
    /// naming them.
    fn binder_names(&self, rows: &[Row], j: usize, h: &Head) -> Vec<String> {
        let mut names = h
            .args
            .iter()
            .map(|p| p.var.as_str().to_string())
            .collect::<Vec<_>>();
        for r in rows {
            if let Pattern::Con(_, c, ps) = &r.pats[j] {
                if *c == h.name {
                    for (n, p) in names.iter_mut().zip(ps) {
                        if let Pattern::Var(_, v) = p {
                            if is_named(v) {
                                *n = v.as_str().to_string();
                            }
                        }
                    }
                    break;
                }
            }
        }
        names
    }

    fn leaf(
        &mut self,
        m: &mut Matcher,
        row: Row,
        cols: Vec<(Term, Term)>,
        goal: &Term,
    ) -> Result<Term, Error> {
        m.used[row.index] = true;
        let clause = &m.clauses[row.index];
        let Some(rhs) = &clause.rhs else {
            return Err(TypeMismatch {
                expected: "an absurd pattern".to_string(),
                actual: "a clause without body".to_string(),
                loc: clause.loc,
            });
        };
        let len = self.ctx.len();
        let mut binds = row.binds;
        for (p, (tm, ty)) in row.pats.iter().zip(cols) {
            if let Pattern::Var(_, v) = p {
                if is_named(v) {
                    binds.push((v.clone(), tm, ty, len));
                }
            }
        }
        for (v, tm, ty, len) in &binds {
            self.aliases.insert(v.clone(), (tm.clone(), ty.clone(), *len));
        }
        let ret = self.check(rhs, goal);
        for (v, ..) in &binds {
            self.aliases.remove(v);
        }
        ret
    }
}

fn empty_case(scrut: Term, goal: &Term) -> Term {
    let motive = match scrut {
        Term::Var(i) => goal.abstract_var(i),
        _ => goal.lift(1),
    };
    Term::Case(Box::new(data::Case {
        scrut,
        motive,
        clauses: Default::default(),
    }))
}

/// The sub-patterns a pattern contributes under constructor `h`, or `None`
/// when it cannot match it.
fn specialize(p: &Pattern, h: &Head, k: usize) -> Result<Option<Vec<Pattern>>, Error> {
    Ok(match p {
        Pattern::Var(loc, _) => Some(wildcards(*loc, k)),
        Pattern::Con(loc, c, ps) if *c == h.name => {
            if ps.len() != k {
                return Err(TypeMismatch {
                    expected: format!("{k} arguments to {}", short_name(c)),
                    actual: format!("{} arguments", ps.len()),
                    loc: *loc,
                });
            }
            Some(ps.clone())
        }
        Pattern::Num(loc, n) => match (h.head, n) {
            (ClauseHead::Zero, 0) => Some(Default::default()),
            (ClauseHead::Suc, n) if *n > 0 => Some(vec![Pattern::Num(*loc, n - 1)]),
            _ => None,
        },
        _ => None,
    })
}
