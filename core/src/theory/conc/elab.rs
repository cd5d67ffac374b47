use std::collections::{HashMap, HashSet};
use std::mem::take;

use log::{debug, trace};

use crate::cache::ContentHash;
use crate::config::Config;
use crate::theory::abs::data::{Level, LevelVar, MetaId, Side, Sort, Term};
use crate::theory::abs::def::{Body, ClassField, Def, Env, Sigma};
use crate::theory::abs::meta::{Cmp, MetaKind, Metas};
use crate::theory::abs::normalize::{Memo, Normalizer};
use crate::theory::abs::pretty::Printer;
use crate::theory::abs::unify::{retry_constraints, Unifier};
use crate::theory::conc::data::{
    CtorDecl, Decl, DeclBody, Expr, FieldDecl, FuncBody, Implementation, LevelExpr, Pattern,
};
use crate::theory::conc::instance::Obligation;
use crate::theory::conc::termination;
use crate::theory::{short_name, Loc, LocalVar, Name, Param, ParamInfo, Tele};
use crate::{maybe_grow, Error, Warning};

/// Bidirectional elaboration of one module's declarations into core
/// definitions.
pub struct Elaborator<'a> {
    pub(super) base: &'a Sigma,
    pub(super) config: &'a Config,
    pub(super) own: Sigma,
    pub(super) metas: Metas,
    pub(super) memo: Memo,
    /// The local context, outermost first.
    pub(super) ctx: Tele<Term>,
    /// `let` values of the context entries.
    pub(super) values: Vec<Option<Term>>,
    /// Pattern variables standing for terms, with their types and the context
    /// length they were made in.
    pub(super) aliases: HashMap<LocalVar, (Term, Term, usize)>,
    pub(super) obligations: Vec<Obligation>,
    goals: Vec<MetaId>,
    pub(super) warnings: Vec<Warning>,
    failed: HashSet<Name>,
    /// The names of the declaration being checked, referenced at their own
    /// level parameters.
    current: Vec<Name>,
}

impl<'a> Elaborator<'a> {
    pub fn new(base: &'a Sigma, config: &'a Config) -> Self {
        Self {
            base,
            config,
            own: Default::default(),
            metas: Default::default(),
            memo: Default::default(),
            ctx: Default::default(),
            values: Default::default(),
            aliases: Default::default(),
            obligations: Default::default(),
            goals: Default::default(),
            warnings: Default::default(),
            failed: Default::default(),
            current: Default::default(),
        }
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        take(&mut self.warnings)
    }

    /// Marks declarations that never reached elaboration, e.g. because they
    /// failed to resolve.
    pub fn poison(&mut self, names: impl IntoIterator<Item = Name>) {
        self.failed.extend(names)
    }

    /// Elaborates one resolved declaration of the module whose text is `src`.
    /// A failed declaration poisons every later declaration using it.
    pub fn decl(&mut self, d: &Decl, src: &str) -> Result<Vec<Def>, Error> {
        self.reset();
        if let Some((n, loc)) = d
            .globals()
            .into_iter()
            .find(|(n, _)| self.failed.contains(n))
        {
            self.failed.extend(d.names());
            return Err(Error::DependencyFailed {
                name: short_name(&d.name).to_string(),
                failed: short_name(&n).to_string(),
                loc,
            });
        }
        self.current = d.names();
        let ret = match &d.body {
            DeclBody::Func { ret, body } => self.func(d, ret.as_ref(), body),
            DeclBody::Data { sort, ctors } => self.data(d, sort.as_ref(), ctors),
            DeclBody::Class { supers, fields } => self.class(d, supers, fields),
            DeclBody::Instance { class, impls } => self.instance(d, class, impls),
        };
        let names = take(&mut self.current);
        match ret {
            Ok(mut defs) => {
                self.seal(&mut defs, d.source(src));
                for def in &defs {
                    self.own.insert(def.clone());
                }
                debug!(target: "elab", "checked {}", d.name);
                Ok(defs)
            }
            Err(e) => {
                debug!(target: "elab", "{} failed: {e}", d.name);
                for n in names {
                    self.own.remove(&n);
                    self.failed.insert(n);
                }
                Err(e)
            }
        }
    }

    fn reset(&mut self) {
        self.metas = Default::default();
        self.ctx.clear();
        self.values.clear();
        self.aliases.clear();
        self.obligations.clear();
        self.goals.clear();
    }

    /// Fills in dependencies and content hashes. Definitions of one
    /// declaration share the hash of its source text.
    fn seal(&self, defs: &mut [Def], source: &str) {
        let group = defs.iter().map(|d| d.name).collect::<Vec<_>>();
        let mut deps = Vec::default();
        for d in defs.iter_mut() {
            d.collect_deps();
            deps.extend(d.deps.iter().filter(|n| !group.contains(n)).copied());
        }
        deps.sort();
        deps.dedup();
        let env = Env::new(self.base, &self.own);
        let group_hash = ContentHash::with_deps(
            source.as_bytes(),
            deps.iter().filter_map(|n| env.get(n)).map(|d| d.hash),
        );
        for d in defs {
            d.hash = ContentHash::with_deps(d.name.as_bytes(), [group_hash]);
        }
    }

    pub(super) fn push(&mut self, var: LocalVar, info: ParamInfo, typ: Term, value: Option<Term>) {
        self.ctx.push(Param::new(var, info, typ));
        self.values.push(value);
    }

    pub(super) fn pop(&mut self, n: usize) {
        let len = self.ctx.len() - n;
        self.ctx.truncate(len);
        self.values.truncate(len);
    }

    pub(super) fn whnf(&mut self, tm: &Term, loc: Loc) -> Result<Term, Error> {
        Normalizer::new(
            Env::new(self.base, &self.own),
            &self.metas,
            &mut self.memo,
            &self.values,
            self.config.reduction_fuel,
            loc,
        )
        .whnf(tm)
    }

    pub(super) fn unify(&mut self, lhs: &Term, rhs: &Term, loc: Loc) -> Result<(), Error> {
        self.unify_cmp(lhs, rhs, Cmp::Eq, loc)
    }

    pub(super) fn subtype(&mut self, got: &Term, expected: &Term, loc: Loc) -> Result<(), Error> {
        self.unify_cmp(got, expected, Cmp::Le, loc)
    }

    fn unify_cmp(&mut self, lhs: &Term, rhs: &Term, cmp: Cmp, loc: Loc) -> Result<(), Error> {
        let ret = Unifier::new(
            Env::new(self.base, &self.own),
            &mut self.metas,
            &mut self.memo,
            &self.values,
            self.config,
            loc,
        )
        .unify_cmp(lhs, rhs, cmp);
        ret.map_err(|e| match e {
            Error::TypeMismatch { .. } => Error::TypeMismatch {
                expected: self.show(rhs),
                actual: self.show(lhs),
                loc,
            },
            e => e,
        })
    }

    pub(super) fn show(&self, tm: &Term) -> String {
        Printer::new(self.ctx.iter().map(|p| p.var.name).collect()).term(&self.metas.zonk(tm))
    }

    pub(super) fn fresh(&mut self, typ: Term, kind: MetaKind, loc: Loc) -> Term {
        self.metas.fresh(&self.ctx, typ, kind, loc)
    }

    pub(super) fn fresh_type(&mut self, loc: Loc) -> Term {
        let s = self.metas.fresh_sort();
        self.fresh(Term::Univ(s), MetaKind::Implicit, loc)
    }

    fn goal(&mut self, typ: Term, loc: Loc) -> Term {
        let tm = self.fresh(typ, MetaKind::Goal, loc);
        self.goals.extend(tm.is_meta_headed());
        tm
    }

    /// Fills an argument the user left out: a metavariable, which for an
    /// instance argument is also queued for instance search.
    pub(super) fn implicit_arg(
        &mut self,
        typ: &Term,
        info: ParamInfo,
        loc: Loc,
    ) -> Result<Term, Error> {
        if info != ParamInfo::Instance {
            return Ok(self.fresh(typ.clone(), MetaKind::Implicit, loc));
        }
        let (class, _, _) = self.class_type(typ, loc)?;
        let tm = self.fresh(typ.clone(), MetaKind::Instance(class), loc);
        if let Some(meta) = tm.is_meta_headed() {
            self.obligations.push(Obligation {
                meta,
                ctx: self.ctx.clone(),
                values: self.values.clone(),
                loc,
            });
        }
        Ok(tm)
    }

    pub(super) fn class_type(
        &mut self,
        typ: &Term,
        loc: Loc,
    ) -> Result<(Name, Sort, Vec<Term>), Error> {
        match self.whnf(typ, loc)? {
            Term::ClassType(c, s, ps) => Ok((c, s, ps)),
            t => Err(Error::TypeMismatch {
                expected: "a class".to_string(),
                actual: self.show(&t),
                loc,
            }),
        }
    }

    pub(super) fn class_fields(&self, class: &Name) -> Vec<ClassField> {
        match Env::new(self.base, &self.own).get(class).map(|d| &d.body) {
            Some(Body::Class { fields, .. }) => fields.clone(),
            _ => Default::default(),
        }
    }

    fn sort_le(&mut self, lo: &Sort, hi: &Sort, loc: Loc) -> Result<(), Error> {
        self.metas.p.add_le(&lo.p, &hi.p, loc)?;
        self.metas.h.add_le(&lo.h, &hi.h, loc)
    }

    fn max_sort(&mut self, a: Sort, b: Sort, loc: Loc) -> Result<Sort, Error> {
        use Level::Const;
        if a == b {
            return Ok(a);
        }
        if let (Const(ap), Const(ah), Const(bp), Const(bh)) = (a.p, a.h, b.p, b.h) {
            return Ok(Sort::new(Const(ap.max(bp)), Const(ah.max(bh))));
        }
        let s = self.metas.fresh_sort();
        self.sort_le(&a, &s, loc)?;
        self.sort_le(&b, &s, loc)?;
        Ok(s)
    }

    /// A global reference instantiated at fresh levels, or at the enclosing
    /// levels when it is being defined.
    pub(super) fn global(&mut self, n: Name, loc: Loc) -> Result<(Term, Term), Error> {
        let s = if self.current.contains(&n) {
            Sort::params()
        } else {
            self.metas.fresh_sort()
        };
        match Env::new(self.base, &self.own).get(&n) {
            Some(d) => Ok((Term::Ref(n, s), d.to_type(&s))),
            None => Err(Error::UnresolvedName(short_name(&n).to_string(), loc)),
        }
    }

    fn local(&self, v: &LocalVar, loc: Loc) -> Result<(Term, Term), Error> {
        let n = self.ctx.len();
        if let Some(pos) = self.ctx.iter().rposition(|p| p.var == *v) {
            let i = n - 1 - pos;
            return Ok((Term::Var(i), self.ctx[pos].typ.lift(i + 1)));
        }
        match self.aliases.get(v) {
            Some((tm, typ, len)) => Ok((tm.lift(n - len), typ.lift(n - len))),
            None => Err(Error::UnresolvedName(v.to_string(), loc)),
        }
    }

    pub fn check(&mut self, e: &Expr, ty: &Term) -> Result<Term, Error> {
        maybe_grow(move || self.check_impl(e, ty))
    }

    fn check_impl(&mut self, e: &Expr, ty: &Term) -> Result<Term, Error> {
        use Expr::*;

        let loc = e.loc();
        let expected = self.whnf(ty, loc)?;
        trace!(target: "elab", "check {e} : {}", self.show(&expected));
        match (e, &expected) {
            (Lam(_, p, b), Term::Pi(q, cod)) if p.info == q.info => {
                let dom = match p.typ.as_ref() {
                    Hole(_) => *q.typ.clone(),
                    t => {
                        let (dom, _) = self.infer_type(t)?;
                        self.unify(&q.typ, &dom, t.loc())?;
                        dom
                    }
                };
                self.push(p.var.clone(), p.info, dom.clone(), None);
                let body = self.check(b, cod);
                self.pop(1);
                Ok(Term::Lam(
                    Param::new(p.var.clone(), p.info, dom),
                    Box::new(body?),
                ))
            }
            (e, Term::Pi(q, cod))
                if q.info != ParamInfo::Explicit
                    && !matches!(e, Lam(_, p, _) if p.info == q.info) =>
            {
                // Implicit lambda.
                self.push(q.var.clone(), q.info, *q.typ.clone(), None);
                let body = self.check(e, cod);
                self.pop(1);
                Ok(Term::Lam(q.clone(), Box::new(body?)))
            }
            (Pair(_, a, b), Term::Sigma(p, q)) => {
                let a = self.check(a, &p.typ)?;
                let b = self.check(b, &q.subst(&a))?;
                Ok(Term::Pair(Box::new(a), Box::new(b)))
            }
            (Let(_, v, t, a, b), _) => {
                let (a, at) = self.let_value(t.as_deref(), a)?;
                self.push(v.clone(), ParamInfo::Explicit, at.clone(), Some(a.clone()));
                let body = self.check(b, &ty.lift(1));
                self.pop(1);
                Ok(Term::Let(
                    Param::new(v.clone(), ParamInfo::Explicit, at),
                    Box::new(a),
                    Box::new(body?),
                ))
            }
            (Case(_, scrut, v, ret, clauses), _) => Ok(self
                .case(scrut, v, ret.as_deref(), clauses, Some(ty), loc)?
                .0),
            (Hole(_), _) => Ok(self.fresh(ty.clone(), MetaKind::Implicit, loc)),
            (Goal(_), _) => Ok(self.goal(ty.clone(), loc)),
            _ => {
                let (tm, got) = self.infer(e)?;
                let (tm, got) = self.insert_implicits(tm, got, &expected, loc)?;
                self.subtype(&got, ty, loc)?;
                Ok(tm)
            }
        }
    }

    /// Applies `tm` to metavariables for its leading implicit parameters,
    /// unless the expected type binds the same kind of parameter.
    fn insert_implicits(
        &mut self,
        mut tm: Term,
        mut ty: Term,
        expected: &Term,
        loc: Loc,
    ) -> Result<(Term, Term), Error> {
        loop {
            match self.whnf(&ty, loc)? {
                Term::Pi(q, cod) if q.info != ParamInfo::Explicit => {
                    if matches!(expected, Term::Pi(p, _) if p.info == q.info) {
                        break;
                    }
                    let arg = self.implicit_arg(&q.typ, q.info, loc)?;
                    ty = cod.subst(&arg);
                    tm = Term::App(Box::new(tm), Box::new(arg));
                }
                _ => break,
            }
        }
        Ok((tm, ty))
    }

    pub fn infer(&mut self, e: &Expr) -> Result<(Term, Term), Error> {
        maybe_grow(move || self.infer_impl(e))
    }

    fn infer_impl(&mut self, e: &Expr) -> Result<(Term, Term), Error> {
        use Expr::*;

        let loc = e.loc();
        Ok(match e {
            Unresolved(_, n) => return Err(Error::UnresolvedName(n.to_string(), loc)),
            Local(_, v) => self.local(v, loc)?,
            Global(_, n) => self.global(*n, loc)?,
            Univ(_, p, h) => {
                let s = Sort::new(level(p), level(h));
                match s.checked_suc() {
                    Some(t) if s.p != Level::Inf => (Term::Univ(s), Term::Univ(t)),
                    _ => {
                        return Err(Error::LevelInconsistency(
                            format!("no universe contains \\Type {} {}", s.p, s.h),
                            loc,
                        ))
                    }
                }
            }
            Pi(_, p, b) | Sigma(_, p, b) => {
                let (dom, s) = self.infer_type(&p.typ)?;
                self.push(p.var.clone(), p.info, dom.clone(), None);
                let cod = self.infer_type(b);
                self.pop(1);
                let (cod, t) = cod?;
                let s = self.max_sort(s, t, loc)?;
                let p = Param::new(p.var.clone(), p.info, dom);
                let tm = match e {
                    Pi(..) => Term::Pi(p, Box::new(cod)),
                    _ => Term::Sigma(p, Box::new(cod)),
                };
                (tm, Term::Univ(s))
            }
            Lam(_, p, b) => {
                let dom = match p.typ.as_ref() {
                    Hole(l) => self.fresh_type(*l),
                    t => self.infer_type(t)?.0,
                };
                self.push(p.var.clone(), p.info, dom.clone(), None);
                let body = self.infer(b);
                self.pop(1);
                let (body, bt) = body?;
                let p = Param::new(p.var.clone(), p.info, dom);
                (
                    Term::Lam(p.clone(), Box::new(body)),
                    Term::Pi(p, Box::new(bt)),
                )
            }
            App(_, f, info, x) => self.app(f, *info, x, loc)?,
            Let(_, v, t, a, b) => {
                let (a, at) = self.let_value(t.as_deref(), a)?;
                self.push(v.clone(), ParamInfo::Explicit, at.clone(), Some(a.clone()));
                let body = self.infer(b);
                self.pop(1);
                let (body, bt) = body?;
                let ty = bt.subst(&a);
                (
                    Term::Let(
                        Param::new(v.clone(), ParamInfo::Explicit, at),
                        Box::new(a),
                        Box::new(body),
                    ),
                    ty,
                )
            }
            Pair(_, a, b) => {
                let (a, at) = self.infer(a)?;
                let (b, bt) = self.infer(b)?;
                (
                    Term::Pair(Box::new(a), Box::new(b)),
                    Term::Sigma(
                        Param::new(LocalVar::hint("_"), ParamInfo::Explicit, at),
                        Box::new(bt.lift(1)),
                    ),
                )
            }
            Proj(_, a, side) => {
                let (t, ty) = self.infer(a)?;
                match self.whnf(&ty, loc)? {
                    Term::Sigma(p, b) => match side {
                        Side::Fst => (Term::Proj(Box::new(t), Side::Fst), *p.typ),
                        Side::Snd => {
                            let fst = Term::Proj(Box::new(t.clone()), Side::Fst);
                            (Term::Proj(Box::new(t), Side::Snd), b.subst(&fst))
                        }
                    },
                    ty => {
                        return Err(Error::TypeMismatch {
                            expected: "a \\Sigma type".to_string(),
                            actual: self.show(&ty),
                            loc,
                        })
                    }
                }
            }
            Case(_, scrut, v, ret, clauses) => {
                self.case(scrut, v, ret.as_deref(), clauses, None, loc)?
            }
            New(_, class, impls) => {
                let (ct, _) = self.infer_type(class)?;
                let (c, s, ps) = self.class_type(&ct, loc)?;
                let xs = self.implementations(c, s, &ps, impls, loc)?;
                (
                    Term::New(c, s, ps.clone(), xs),
                    Term::ClassType(c, s, ps),
                )
            }
            Num(_, n) => (Term::nat(*n), Term::Nat),
            Hole(_) => {
                let ty = self.fresh_type(loc);
                (self.fresh(ty.clone(), MetaKind::Implicit, loc), ty)
            }
            Goal(_) => {
                let ty = self.fresh_type(loc);
                (self.goal(ty.clone(), loc), ty)
            }
        })
    }

    fn app(&mut self, f: &Expr, info: ParamInfo, x: &Expr, loc: Loc) -> Result<(Term, Term), Error> {
        let (mut tm, mut ty) = self.infer(f)?;
        loop {
            match self.whnf(&ty, loc)? {
                Term::Pi(q, cod) if q.info == info => {
                    let x = self.check(x, &q.typ)?;
                    let ty = cod.subst(&x);
                    return Ok((Term::App(Box::new(tm), Box::new(x)), ty));
                }
                Term::Pi(q, cod) if q.info != ParamInfo::Explicit && info == ParamInfo::Explicit => {
                    let arg = self.implicit_arg(&q.typ, q.info, loc)?;
                    ty = cod.subst(&arg);
                    tm = Term::App(Box::new(tm), Box::new(arg));
                }
                Term::Pi(q, _) => {
                    return Err(Error::TypeMismatch {
                        expected: q.info.wrap("_".to_string()),
                        actual: info.wrap(x.to_string()),
                        loc: x.loc(),
                    })
                }
                t if t.is_meta_headed().is_some() => {
                    let dom = self.fresh_type(loc);
                    self.push(LocalVar::hint("x"), info, dom.clone(), None);
                    let cod = self.fresh_type(loc);
                    self.pop(1);
                    let pi = Term::Pi(
                        Param::new(LocalVar::hint("x"), info, dom),
                        Box::new(cod),
                    );
                    self.unify(&t, &pi, loc)?;
                    ty = pi;
                }
                _ => return Err(Error::NotAFunction(f.to_string(), f.loc())),
            }
        }
    }

    fn let_value(&mut self, typ: Option<&Expr>, a: &Expr) -> Result<(Term, Term), Error> {
        match typ {
            Some(t) => {
                let (t, _) = self.infer_type(t)?;
                let a = self.check(a, &t)?;
                Ok((a, t))
            }
            None => self.infer(a),
        }
    }

    pub(super) fn infer_type(&mut self, e: &Expr) -> Result<(Term, Sort), Error> {
        let loc = e.loc();
        let (tm, ty) = self.infer(e)?;
        match self.whnf(&ty, loc)? {
            Term::Univ(s) => Ok((tm, s)),
            t if t.is_meta_headed().is_some() => {
                let s = self.metas.fresh_sort();
                self.unify(&t, &Term::Univ(s), loc)?;
                Ok((tm, s))
            }
            _ => Err(Error::NotAType(e.to_string(), loc)),
        }
    }

    /// Elaborates a telescope, leaving it in the context.
    fn tele(&mut self, tele: &Tele<Expr>) -> Result<(Tele<Term>, Vec<Sort>), Error> {
        let mut ret = Tele::default();
        let mut sorts = Vec::default();
        for p in tele {
            let (typ, s) = self.infer_type(&p.typ)?;
            self.push(p.var.clone(), p.info, typ.clone(), None);
            ret.push(Param::new(p.var.clone(), p.info, typ));
            sorts.push(s);
        }
        Ok((ret, sorts))
    }

    /// Field values of `\new`, from the implementations given, defaults, and
    /// instance search for superclasses left unimplemented.
    fn implementations(
        &mut self,
        class: Name,
        sort: Sort,
        params: &[Term],
        impls: &[Implementation],
        loc: Loc,
    ) -> Result<Vec<Term>, Error> {
        let mut used = vec![false; impls.len()];
        let xs = self.fields(class, sort, params, impls, &mut used, loc)?;
        match used.iter().position(|u| !u) {
            Some(k) => Err(Error::UnresolvedName(
                impls[k].name.to_string(),
                impls[k].loc,
            )),
            None => Ok(xs),
        }
    }

    fn fields(
        &mut self,
        class: Name,
        sort: Sort,
        params: &[Term],
        impls: &[Implementation],
        used: &mut [bool],
        loc: Loc,
    ) -> Result<Vec<Term>, Error> {
        let mut values = Vec::default();
        for f in self.class_fields(&class) {
            let typ = instantiate(&f.typ, &sort, params, &values);
            let v = match f.superclass {
                Some(s) if self.implements(&s, impls) => {
                    let (c, s, ps) = self.class_type(&typ, loc)?;
                    let xs = self.fields(c, s, &ps, impls, used, loc)?;
                    Term::New(c, s, ps, xs)
                }
                Some(_) => self.implicit_arg(&typ, ParamInfo::Instance, loc)?,
                None => {
                    let short = short_name(&f.name);
                    match impls.iter().position(|i| i.name.as_str() == short) {
                        Some(k) => {
                            used[k] = true;
                            self.check(&impls[k].body, &typ)?
                        }
                        None => match &f.default {
                            Some(d) => instantiate(d, &sort, params, &values),
                            None => {
                                return Err(Error::TypeMismatch {
                                    expected: format!("an implementation of {short}"),
                                    actual: "none".to_string(),
                                    loc,
                                })
                            }
                        },
                    }
                }
            };
            values.push(v);
        }
        Ok(values)
    }

    /// Whether `impls` names a field of `class` or of its superclasses.
    fn implements(&self, class: &Name, impls: &[Implementation]) -> bool {
        self.class_fields(class).iter().any(|f| match &f.superclass {
            Some(s) => self.implements(s, impls),
            None => impls
                .iter()
                .any(|i| i.name.as_str() == short_name(&f.name)),
        })
    }

    fn func(&mut self, d: &Decl, ret: Option<&Expr>, body: &FuncBody) -> Result<Vec<Def>, Error> {
        let (tele, _) = self.tele(&d.tele)?;
        let ret = match ret {
            Some(e) => self.infer_type(e)?.0,
            None => self.fresh_type(d.loc),
        };
        self.own.insert(Def::new(
            d.loc,
            d.name,
            tele.clone(),
            ret.clone(),
            Body::Undefined,
        ));
        let body = match body {
            FuncBody::Expr(e) => self.check(e, &ret)?,
            FuncBody::Clauses(cs) => {
                let n = self.ctx.len();
                let cols = self
                    .ctx
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.is_explicit())
                    .map(|(k, p)| (Term::Var(n - 1 - k), p.typ.lift(n - k)))
                    .collect();
                self.clauses(cs, cols, &ret, d.loc)?
            }
        };
        self.solve_all()?;

        let tele = self.zonk_tele(&tele);
        let ret = self.metas.zonk(&ret);
        let body = self.metas.zonk(&body);
        self.ensure_solved(tele.iter().map(|p| p.typ.as_ref()).chain([&ret, &body]))?;
        let decreasing = termination::decreasing(d.name, tele.len(), &body, d.loc)?;
        Ok(vec![Def::new(
            d.loc,
            d.name,
            tele,
            ret,
            Body::Fn { body, decreasing },
        )])
    }

    fn data(&mut self, d: &Decl, sort: Option<&Expr>, ctors: &[CtorDecl]) -> Result<Vec<Def>, Error> {
        let (tele, _) = self.tele(&d.tele)?;
        let sort = match sort {
            Some(e) => {
                let (t, _) = self.infer_type(e)?;
                match self.whnf(&t, e.loc())? {
                    Term::Univ(s) => s,
                    _ => return Err(Error::NotAType(e.to_string(), e.loc())),
                }
            }
            None => Sort::params(),
        };
        let ret = Term::Univ(sort);
        self.own.insert(Def::new(
            d.loc,
            d.name,
            tele.clone(),
            ret.clone(),
            Body::Undefined,
        ));

        let mut teles = Vec::with_capacity(ctors.len());
        for c in ctors {
            teles.push(match &c.pats {
                None => {
                    let ct = self.ctor_tele(c, &sort)?;
                    self.pop(ct.len());
                    (None, ct, None)
                }
                Some(pats) => {
                    let ctx = std::mem::take(&mut self.ctx);
                    let values = std::mem::take(&mut self.values);
                    let guarded = self.guarded_ctor(&tele, pats, c, &sort);
                    self.ctx = ctx;
                    self.values = values;
                    let (vars, ct, idx) = guarded?;
                    (Some(vars), ct, Some(idx))
                }
            });
        }
        self.solve_all()?;

        let tele = self.zonk_tele(&tele);
        let teles = teles
            .iter()
            .map(|(vars, ct, idx)| {
                (
                    vars.as_ref().map(|v| self.zonk_tele(v)),
                    self.zonk_tele(ct),
                    idx.as_ref()
                        .map(|xs| xs.iter().map(|x| self.metas.zonk(x)).collect::<Vec<_>>()),
                )
            })
            .collect::<Vec<_>>();
        self.ensure_solved(
            tele.iter()
                .chain(teles.iter().flat_map(|(v, ct, _)| v.iter().flatten().chain(ct)))
                .map(|p| p.typ.as_ref())
                .chain(teles.iter().flat_map(|(_, _, idx)| idx.iter().flatten())),
        )?;

        let np = tele.len();
        let params = tele
            .iter()
            .map(|p| Param::new(p.var.clone(), ParamInfo::Implicit, *p.typ.clone()))
            .collect::<Tele<_>>();
        let mut defs = vec![Def::new(
            d.loc,
            d.name,
            tele,
            ret,
            Body::Data {
                ctors: ctors.iter().map(|c| c.name).collect(),
            },
        )];
        for (index, (c, (vars, ct, idx))) in ctors.iter().zip(teles).enumerate() {
            let m = ct.len();
            let mut ctele = vars.unwrap_or_else(|| params.clone());
            let n = ctele.len();
            ctele.extend(ct);
            let args = match &idx {
                Some(xs) => xs.iter().map(|x| x.lift(m)).collect(),
                None => (0..np).map(|k| Term::Var(m + np - 1 - k)).collect(),
            };
            defs.push(Def::new(
                c.loc,
                c.name,
                ctele,
                Term::Data(d.name, Sort::params(), args),
                Body::Ctor {
                    data: d.name,
                    index,
                    params: n,
                    pats: idx,
                },
            ));
        }
        Ok(defs)
    }

    /// Constructor fields, left in the context.
    fn ctor_tele(&mut self, c: &CtorDecl, sort: &Sort) -> Result<Tele<Term>, Error> {
        let (ct, sorts) = self.tele(&c.tele)?;
        for (p, s) in c.tele.iter().zip(&sorts) {
            self.sort_le(s, sort, p.typ.loc())?;
        }
        Ok(ct)
    }

    /// A constructor guarded by index patterns, elaborated in a context of
    /// just its pattern variables. Gives those variables, the fields and
    /// the index terms.
    fn guarded_ctor(
        &mut self,
        tele: &Tele<Term>,
        pats: &[Pattern],
        c: &CtorDecl,
        sort: &Sort,
    ) -> Result<(Tele<Term>, Tele<Term>, Vec<Term>), Error> {
        let idx = self.index_patterns(pats, tele)?;
        let vars = self.ctx.clone();
        let ct = self.ctor_tele(c, sort)?;
        Ok((vars, ct, idx))
    }

    fn class(&mut self, d: &Decl, supers: &[Expr], fields: &[FieldDecl]) -> Result<Vec<Def>, Error> {
        let (tele, _) = self.tele(&d.tele)?;
        let np = tele.len();
        let sort = Sort::params();

        let mut cfs = Vec::default();
        let mut names = Vec::default();
        for s in supers {
            let (t, _) = self.infer_type(s)?;
            let (c, _, _) = self.class_type(&t, s.loc())?;
            let hidden = Name::from(format!("{}.{}", d.name, short_name(&c)).as_str());
            self.push(
                LocalVar::hint(short_name(&c)),
                ParamInfo::Instance,
                t.clone(),
                None,
            );
            cfs.push(ClassField {
                name: hidden,
                typ: t,
                default: None,
                superclass: Some(c),
            });
            names.push(c);
        }
        for f in fields {
            let (typ, s) = self.infer_type(&f.typ)?;
            self.sort_le(&s, &sort, f.loc)?;
            let default = match &f.default {
                Some(e) => Some(self.check(e, &typ)?),
                None => None,
            };
            self.push(f.var.clone(), ParamInfo::Explicit, typ.clone(), None);
            cfs.push(ClassField {
                name: f.name,
                typ,
                default,
                superclass: None,
            });
        }
        self.solve_all()?;

        let tele = self.zonk_tele(&tele);
        let cfs = cfs
            .into_iter()
            .map(|f| ClassField {
                typ: self.metas.zonk(&f.typ),
                default: f.default.as_ref().map(|t| self.metas.zonk(t)),
                ..f
            })
            .collect::<Vec<_>>();
        self.ensure_solved(
            tele.iter()
                .map(|p| p.typ.as_ref())
                .chain(cfs.iter().map(|f| &f.typ))
                .chain(cfs.iter().filter_map(|f| f.default.as_ref())),
        )?;

        // Accessors take the class parameters implicitly and the instance as
        // an instance argument.
        let mut acc_tele = tele
            .iter()
            .map(|p| Param::new(p.var.clone(), ParamInfo::Implicit, *p.typ.clone()))
            .collect::<Tele<_>>();
        acc_tele.push(Param::new(
            LocalVar::hint("self"),
            ParamInfo::Instance,
            Term::ClassType(
                d.name,
                Sort::params(),
                (0..np).map(|k| Term::Var(np - 1 - k)).collect(),
            ),
        ));
        let mut defs = Vec::default();
        for (index, (f, fd)) in cfs.iter().skip(supers.len()).zip(fields).enumerate() {
            let index = index + supers.len();
            let args = (0..np)
                .map(|k| Term::Var(np - k))
                .chain((0..index).map(|j| Term::Field(Box::new(Term::Var(0)), d.name, j)))
                .collect::<Vec<_>>();
            defs.push(Def::new(
                fd.loc,
                f.name,
                acc_tele.clone(),
                f.typ.subst_all(&args),
                Body::Field {
                    class: d.name,
                    index,
                },
            ));
        }
        defs.insert(
            0,
            Def::new(
                d.loc,
                d.name,
                tele,
                Term::Univ(sort),
                Body::Class {
                    fields: cfs,
                    supers: names,
                },
            ),
        );
        Ok(defs)
    }

    fn instance(&mut self, d: &Decl, class: &Expr, impls: &[Implementation]) -> Result<Vec<Def>, Error> {
        let (tele, _) = self.tele(&d.tele)?;
        let (ct, _) = self.infer_type(class)?;
        let (c, s, ps) = self.class_type(&ct, class.loc())?;
        let xs = self.implementations(c, s, &ps, impls, d.loc)?;
        self.solve_all()?;

        let tele = self.zonk_tele(&tele);
        let ret = self.metas.zonk(&Term::ClassType(c, s, ps.clone()));
        let body = self.metas.zonk(&Term::New(c, s, ps, xs));
        self.ensure_solved(tele.iter().map(|p| p.typ.as_ref()).chain([&ret, &body]))?;
        Ok(vec![Def::new(
            d.loc,
            d.name,
            tele,
            ret,
            Body::Instance { class: c, body },
        )])
    }

    /// Discharges deferred constraints and instance arguments, then solves the
    /// universe levels. Goals are reported before anything else.
    fn solve_all(&mut self) -> Result<(), Error> {
        let solved = self.solve_constraints();
        if let Some(m) = self.goals.first() {
            let (context, expected) = self.meta_context(*m);
            return Err(Error::Goal {
                expected,
                context,
                loc: self.metas.get(*m).loc,
            });
        }
        solved?;
        self.metas.solve_levels()
    }

    fn solve_constraints(&mut self) -> Result<(), Error> {
        // Instances whose goal still has metavariables wait until nothing
        // else makes progress.
        for force in [false, true] {
            loop {
                let mut progress = retry_constraints(
                    Env::new(self.base, &self.own),
                    &mut self.metas,
                    &mut self.memo,
                    self.config,
                )?;
                progress |= self.resolve_obligations(force)?;
                if !progress {
                    break;
                }
            }
        }
        match self.metas.constraints.first() {
            Some(c) => Err(Error::UnsolvedConstraint(
                format!(
                    "{} = {}",
                    self.metas.zonk(&c.lhs),
                    self.metas.zonk(&c.rhs)
                ),
                c.loc,
            )),
            None => Ok(()),
        }
    }

    /// The context and expected type of a metavariable, printed.
    fn meta_context(&self, m: MetaId) -> (Vec<(String, String)>, String) {
        let mv = self.metas.get(m);
        let mut names = Vec::default();
        let mut context = Vec::default();
        let mut t = self.metas.zonk(&mv.typ);
        for _ in 0..mv.arity {
            match t {
                Term::Pi(p, b) => {
                    context.push((
                        p.var.name.to_string(),
                        Printer::new(names.clone()).term(&p.typ),
                    ));
                    names.push(p.var.name);
                    t = *b;
                }
                _ => break,
            }
        }
        (context, Printer::new(names).term(&t))
    }

    fn ensure_solved<'t>(&self, tms: impl IntoIterator<Item = &'t Term>) -> Result<(), Error> {
        for tm in tms {
            if let Some(m) = tm.metas().first() {
                let (_, expected) = self.meta_context(*m);
                return Err(Error::UnsolvedMetavariable(
                    format!("?{m} : {expected}"),
                    self.metas.get(*m).loc,
                ));
            }
        }
        Ok(())
    }

    fn zonk_tele(&self, tele: &Tele<Term>) -> Tele<Term> {
        tele.iter()
            .map(|p| Param::new(p.var.clone(), p.info, self.metas.zonk(&p.typ)))
            .collect()
    }
}

fn level(l: &Option<LevelExpr>) -> Level {
    match l {
        None => Level::param(),
        Some(LevelExpr::Const(n)) => Level::Const(*n),
        Some(LevelExpr::Param { add, max }) => Level::var(LevelVar::Param, *add, *max),
        Some(LevelExpr::Inf) => Level::Inf,
    }
}

/// Instantiates a class field type or default, which lives under the class
/// parameters and the preceding fields.
pub(super) fn instantiate(tm: &Term, sort: &Sort, params: &[Term], fields: &[Term]) -> Term {
    let args = params.iter().chain(fields).cloned().collect::<Vec<_>>();
    tm.subst_levels(sort).subst_all(&args)
}
