use std::collections::{HashMap, HashSet};

use ustr::Ustr;

use crate::theory::abs::def::{Body, Def, Prim};
use crate::theory::conc::data::{
    Clause, CtorDecl, Decl, DeclBody, Expr, FieldDecl, FuncBody, Implementation, Pattern,
};
use crate::theory::{module_of, short_name, Loc, LocalVar, Name, Param, Tele};
use crate::Error;
use crate::Error::{DuplicateName, TypeMismatch, UnresolvedName};

/// Globals visible to a module: its imports and its own earlier
/// declarations.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    globals: HashMap<Ustr, Vec<Name>>,
    ctors: HashSet<Name>,
}

impl Scope {
    pub fn import<'a>(&mut self, defs: impl IntoIterator<Item = &'a Def>) {
        for d in defs {
            let is_ctor = matches!(
                d.body,
                Body::Ctor { .. } | Body::Prim(Prim::Zero) | Body::Prim(Prim::Suc)
            );
            self.declare(d.name, is_ctor)
        }
    }

    fn declare(&mut self, name: Name, is_ctor: bool) {
        let names = self
            .globals
            .entry(Ustr::from(short_name(&name)))
            .or_default();
        if !names.contains(&name) {
            names.push(name)
        }
        if is_ctor {
            self.ctors.insert(name);
        }
    }
}

pub struct Resolver {
    module: Ustr,
    scope: Scope,
    locals: HashMap<Ustr, LocalVar>,
}

impl Resolver {
    pub fn new(module: Ustr, scope: Scope) -> Self {
        Self {
            module,
            scope,
            locals: Default::default(),
        }
    }

    /// Resolves every declaration on its own, so one failure does not hide
    /// the others.
    pub fn decls(&mut self, decls: Vec<Decl>) -> Vec<Result<Decl, Error>> {
        let mut own = HashSet::new();
        decls
            .into_iter()
            .map(|d| {
                for n in d.names() {
                    if !own.insert(n) {
                        return Err(DuplicateName(short_name(&n).to_string(), d.loc));
                    }
                }
                self.declare(&d);
                let saved = self.locals.clone();
                let ret = self.decl(d);
                self.locals = saved;
                ret
            })
            .collect()
    }

    fn declare(&mut self, d: &Decl) {
        self.scope.declare(d.name, false);
        match &d.body {
            DeclBody::Data { ctors, .. } => {
                for c in ctors {
                    self.scope.declare(c.name, true)
                }
            }
            DeclBody::Class { fields, .. } => {
                for f in fields {
                    self.scope.declare(f.name, false)
                }
            }
            _ => {}
        }
    }

    fn candidates(&self, n: &Ustr) -> Vec<Name> {
        let all = self.scope.globals.get(n).cloned().unwrap_or_default();
        match all.iter().find(|x| module_of(x) == self.module.as_str()) {
            Some(own) => vec![*own],
            None => all,
        }
    }

    fn global(&self, loc: Loc, n: Ustr) -> Result<Name, Error> {
        match self.candidates(&n).as_slice() {
            [] => Err(UnresolvedName(n.to_string(), loc)),
            [x] => Ok(*x),
            xs => Err(DuplicateName(
                format!(
                    "{n} (from {})",
                    xs.iter()
                        .map(|x| module_of(x).to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                loc,
            )),
        }
    }

    fn ctor(&self, n: &Ustr) -> Option<Name> {
        self.candidates(n)
            .into_iter()
            .find(|x| self.scope.ctors.contains(x))
    }

    fn insert(&mut self, v: &LocalVar) {
        if v.as_str() != "_" {
            self.locals.insert(v.name, v.clone());
        }
    }

    fn bodied<R>(&mut self, vars: &[&LocalVar], f: impl FnOnce(&mut Self) -> R) -> R {
        let olds = vars
            .iter()
            .map(|v| (v.name, self.locals.get(&v.name).cloned()))
            .collect::<Vec<_>>();
        for v in vars {
            self.insert(v);
        }
        let ret = f(self);
        for (n, old) in olds.into_iter().rev() {
            match old {
                Some(v) => self.locals.insert(n, v),
                None => self.locals.remove(&n),
            };
        }
        ret
    }

    fn decl(&mut self, d: Decl) -> Result<Decl, Error> {
        use DeclBody::*;

        let Decl {
            loc,
            name,
            tele,
            body,
        } = d;
        let tele = self.tele(tele)?;
        let body = match body {
            Func { ret, body } => {
                let ret = ret.map(|e| self.expr(e)).transpose()?;
                let body = match body {
                    FuncBody::Expr(e) => FuncBody::Expr(self.expr(e)?),
                    FuncBody::Clauses(cs) => {
                        // Matched parameters are only reachable through the patterns.
                        for p in tele.iter().filter(|p| p.is_explicit()) {
                            if self.locals.get(&p.var.name) == Some(&p.var) {
                                self.locals.remove(&p.var.name);
                            }
                        }
                        FuncBody::Clauses(
                            cs.into_iter()
                                .map(|c| self.clause(c))
                                .collect::<Result<_, _>>()?,
                        )
                    }
                };
                Func { ret, body }
            }
            Data { sort, ctors } => Data {
                sort: sort.map(|e| self.expr(e)).transpose()?,
                ctors: ctors
                    .into_iter()
                    .map(|c| self.ctor_decl(&tele, c))
                    .collect::<Result<_, _>>()?,
            },
            Class { supers, fields } => {
                let supers = supers
                    .into_iter()
                    .map(|e| self.expr(e))
                    .collect::<Result<_, _>>()?;
                let mut resolved = Vec::with_capacity(fields.len());
                for f in fields {
                    resolved.push(self.field(f)?);
                }
                Class {
                    supers,
                    fields: resolved,
                }
            }
            Instance { class, impls } => Instance {
                class: self.expr(class)?,
                impls: self.impls(impls)?,
            },
        };
        Ok(Decl {
            loc,
            name,
            tele,
            body,
        })
    }

    fn ctor_decl(&mut self, data: &Tele<Expr>, c: CtorDecl) -> Result<CtorDecl, Error> {
        let saved = self.locals.clone();
        let ret = self.guarded_ctor(data, c);
        self.locals = saved;
        ret
    }

    /// A constructor guarded by patterns sees the pattern variables instead
    /// of the data parameters.
    fn guarded_ctor(&mut self, data: &Tele<Expr>, c: CtorDecl) -> Result<CtorDecl, Error> {
        let pats = match c.pats {
            Some(pats) => {
                if pats.len() != data.len() {
                    return Err(TypeMismatch {
                        expected: format!("{} patterns", data.len()),
                        actual: format!("{} patterns", pats.len()),
                        loc: c.loc,
                    });
                }
                for p in data {
                    self.locals.remove(&p.var.name);
                }
                let mut binds = Vec::default();
                let pats = pats
                    .into_iter()
                    .map(|p| self.pattern(p, &mut binds))
                    .collect::<Result<Vec<_>, _>>()?;
                for v in &binds {
                    self.insert(v);
                }
                Some(pats)
            }
            None => None,
        };
        Ok(CtorDecl {
            loc: c.loc,
            name: c.name,
            pats,
            tele: self.tele(c.tele)?,
        })
    }

    fn field(&mut self, f: FieldDecl) -> Result<FieldDecl, Error> {
        let typ = self.expr(f.typ)?;
        let default = f.default.map(|e| self.expr(e)).transpose()?;
        self.insert(&f.var);
        Ok(FieldDecl {
            loc: f.loc,
            name: f.name,
            var: f.var,
            typ,
            default,
        })
    }

    fn impls(&mut self, impls: Vec<Implementation>) -> Result<Vec<Implementation>, Error> {
        impls
            .into_iter()
            .map(|i| {
                Ok(Implementation {
                    loc: i.loc,
                    name: i.name,
                    body: self.expr(i.body)?,
                })
            })
            .collect()
    }

    /// Resolves a telescope, leaving its variables in scope.
    fn tele(&mut self, tele: Tele<Expr>) -> Result<Tele<Expr>, Error> {
        let mut ret = Tele::default();
        for p in tele {
            let p = self.param(p)?;
            self.insert(&p.var);
            ret.push(p);
        }
        Ok(ret)
    }

    fn param(&mut self, p: Param<Expr>) -> Result<Param<Expr>, Error> {
        Ok(Param {
            var: p.var,
            info: p.info,
            typ: Box::new(self.expr(*p.typ)?),
        })
    }

    fn clause(&mut self, c: Clause) -> Result<Clause, Error> {
        let mut binds = Vec::default();
        let pats = c
            .pats
            .into_iter()
            .map(|p| self.pattern(p, &mut binds))
            .collect::<Result<Vec<_>, _>>()?;
        let vars = binds.iter().collect::<Vec<_>>();
        let rhs = match c.rhs {
            Some(e) => Some(self.bodied(&vars, |s| s.expr(e))?),
            None => None,
        };
        Ok(Clause {
            loc: c.loc,
            pats,
            rhs,
        })
    }

    fn pattern(&mut self, p: Pattern, binds: &mut Vec<LocalVar>) -> Result<Pattern, Error> {
        Ok(match p {
            Pattern::Unresolved(loc, n, args) => match self.ctor(&n) {
                Some(c) => Pattern::Con(
                    loc,
                    c,
                    args.into_iter()
                        .map(|a| self.pattern(a, binds))
                        .collect::<Result<_, _>>()?,
                ),
                None if args.is_empty() => {
                    if binds.iter().any(|v| v.name == n) {
                        return Err(DuplicateName(n.to_string(), loc));
                    }
                    let v = LocalVar::new(n.as_str());
                    binds.push(v.clone());
                    Pattern::Var(loc, v)
                }
                None => return Err(UnresolvedName(n.to_string(), loc)),
            },
            Pattern::Con(loc, c, args) => Pattern::Con(
                loc,
                c,
                args.into_iter()
                    .map(|a| self.pattern(a, binds))
                    .collect::<Result<_, _>>()?,
            ),
            p => p,
        })
    }

    pub fn expr(&mut self, e: Expr) -> Result<Expr, Error> {
        crate::maybe_grow(move || self.expr_impl(e))
    }

    fn expr_impl(&mut self, e: Expr) -> Result<Expr, Error> {
        use Expr::*;
        Ok(match e {
            Unresolved(loc, n) => match self.locals.get(&n) {
                Some(v) => Local(loc, v.clone()),
                None => Global(loc, self.global(loc, n)?),
            },
            Pi(loc, p, b) => {
                let p = self.param(p)?;
                let b = self.bodied(&[&p.var], |s| s.expr(*b))?;
                Pi(loc, p, Box::new(b))
            }
            Lam(loc, p, b) => {
                let p = self.param(p)?;
                let b = self.bodied(&[&p.var], |s| s.expr(*b))?;
                Lam(loc, p, Box::new(b))
            }
            Sigma(loc, p, b) => {
                let p = self.param(p)?;
                let b = self.bodied(&[&p.var], |s| s.expr(*b))?;
                Sigma(loc, p, Box::new(b))
            }
            App(loc, f, i, x) => App(loc, Box::new(self.expr(*f)?), i, Box::new(self.expr(*x)?)),
            Let(loc, v, t, a, b) => {
                let t = match t {
                    Some(t) => Some(Box::new(self.expr(*t)?)),
                    None => None,
                };
                let a = self.expr(*a)?;
                let b = self.bodied(&[&v], |s| s.expr(*b))?;
                Let(loc, v, t, Box::new(a), Box::new(b))
            }
            Pair(loc, a, b) => Pair(loc, Box::new(self.expr(*a)?), Box::new(self.expr(*b)?)),
            Proj(loc, a, s) => Proj(loc, Box::new(self.expr(*a)?), s),
            Case(loc, scrut, v, ret, clauses) => {
                let scrut = self.expr(*scrut)?;
                let ret = match ret {
                    Some(t) => Some(Box::new(self.bodied(&[&v], |s| s.expr(*t))?)),
                    None => None,
                };
                let clauses = clauses
                    .into_iter()
                    .map(|c| self.clause(c))
                    .collect::<Result<_, _>>()?;
                Case(loc, Box::new(scrut), v, ret, clauses)
            }
            New(loc, c, impls) => New(loc, Box::new(self.expr(*c)?), self.impls(impls)?),
            e => e,
        })
    }
}
