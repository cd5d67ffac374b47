use std::str::FromStr;

use pest::error::ErrorVariant;
use pest::iterators::{Pair, Pairs};
use pest::Span;
use ustr::Ustr;

use crate::theory::abs::data::Side;
use crate::theory::conc::data::{
    Clause, CtorDecl, Decl, DeclBody, Expr, FieldDecl, FuncBody, Implementation, Import,
    LevelExpr, Pattern,
};
use crate::theory::ParamInfo::{Explicit, Implicit, Instance};
use crate::theory::{qualify, Loc, LocalVar, Name, Param, ParamInfo, Tele};
use crate::{Error, Rule};

/// Which of the two levels of `\Type` a level expression stands for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum LevelSlot {
    Predicative,
    Homotopy,
}

/// Turns parse trees into unresolved declarations of one module.
pub struct Trans {
    module: Ustr,
    error: Option<Error>,
}

impl Trans {
    pub fn new(module: Ustr) -> Self {
        Self {
            module,
            error: None,
        }
    }

    /// The first error met during the last translation.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    fn fail(&mut self, span: Span, message: String) {
        if self.error.is_none() {
            let e = pest::error::Error::new_from_span(ErrorVariant::CustomError { message }, span);
            self.error = Some(Error::Parsing(Box::new(e)));
        }
    }

    fn number<T: FromStr + Default>(&mut self, p: &Pair<Rule>) -> T {
        p.as_str().parse().unwrap_or_else(|_| {
            self.fail(p.as_span(), format!("{} is too large", p.as_str()));
            T::default()
        })
    }

    fn name(&self, p: &Pair<Rule>) -> Name {
        qualify(&self.module, p.as_str())
    }

    pub fn file(&mut self, mut f: Pairs<Rule>) -> (Vec<Import>, Vec<Decl>) {
        let mut imports = Vec::default();
        let mut decls = Vec::default();
        for d in f.next().unwrap().into_inner() {
            match d.as_rule() {
                Rule::import => imports.push(Self::import(d)),
                Rule::func_def => decls.push(self.func_def(d)),
                Rule::data_def => decls.push(self.data_def(d)),
                Rule::class_def => decls.push(self.class_def(d)),
                Rule::instance_def => decls.push(self.instance_def(d)),
                Rule::EOI => break,
                _ => unreachable!(),
            }
        }
        (imports, decls)
    }

    fn import(d: Pair<Rule>) -> Import {
        let loc = Loc::from(d.as_span());
        let m = d.into_inner().next().unwrap();
        Import {
            loc,
            module: Ustr::from(m.as_str()),
        }
    }

    fn func_def(&mut self, f: Pair<Rule>) -> Decl {
        let loc = Loc::from(f.as_span());
        let mut pairs = f.into_inner();
        let name = self.name(&pairs.next().unwrap());
        let mut tele = Tele::default();
        let mut ret = None;
        let mut body = None;
        for p in pairs {
            match p.as_rule() {
                Rule::explicit_param | Rule::implicit_param | Rule::instance_param => {
                    tele.extend(self.param(p))
                }
                Rule::func_expr => body = Some(FuncBody::Expr(self.expr(p.into_inner().next().unwrap()))),
                Rule::func_clauses => {
                    body = Some(FuncBody::Clauses(p.into_inner().map(|c| self.clause(c)).collect()))
                }
                _ => ret = Some(self.expr(p)),
            }
        }
        Decl {
            loc,
            name,
            tele,
            body: DeclBody::Func {
                ret,
                body: body.unwrap(),
            },
        }
    }

    fn data_def(&mut self, d: Pair<Rule>) -> Decl {
        let loc = Loc::from(d.as_span());
        let mut pairs = d.into_inner();
        let name = self.name(&pairs.next().unwrap());
        let mut tele = Tele::default();
        let mut sort = None;
        let mut ctors = Vec::default();
        for p in pairs {
            match p.as_rule() {
                Rule::explicit_param | Rule::implicit_param | Rule::instance_param => {
                    tele.extend(self.param(p))
                }
                Rule::ctor => ctors.push(self.ctor(p)),
                Rule::data_with => ctors.extend(p.into_inner().map(|c| self.ctor(c))),
                _ => sort = Some(self.expr(p)),
            }
        }
        Decl {
            loc,
            name,
            tele,
            body: DeclBody::Data { sort, ctors },
        }
    }

    fn ctor(&mut self, c: Pair<Rule>) -> CtorDecl {
        let loc = Loc::from(c.as_span());
        let guarded = c.as_rule() == Rule::data_clause;
        let mut pairs = c.into_inner().peekable();
        let mut pats = Vec::default();
        while let Some(p) = pairs.next_if(|p| p.as_rule() != Rule::ident) {
            pats.push(self.pattern(p));
        }
        let pats = guarded.then_some(pats);
        let name = self.name(&pairs.next().unwrap());
        let mut tele = Tele::default();
        for p in pairs {
            match p.as_rule() {
                Rule::anon_param => {
                    let typ = self.expr(p.into_inner().next().unwrap());
                    tele.push(Param::new(LocalVar::unbound(), Explicit, typ))
                }
                _ => tele.extend(self.param(p)),
            }
        }
        CtorDecl {
            loc,
            name,
            pats,
            tele,
        }
    }

    fn class_def(&mut self, c: Pair<Rule>) -> Decl {
        let loc = Loc::from(c.as_span());
        let mut pairs = c.into_inner();
        let name = self.name(&pairs.next().unwrap());
        let mut tele = Tele::default();
        let mut supers = Vec::default();
        let mut fields = Vec::default();
        for p in pairs {
            match p.as_rule() {
                Rule::extends => supers.extend(p.into_inner().map(|s| self.expr(s))),
                Rule::field => fields.push(self.field(p)),
                _ => tele.extend(self.param(p)),
            }
        }
        Decl {
            loc,
            name,
            tele,
            body: DeclBody::Class { supers, fields },
        }
    }

    fn field(&mut self, f: Pair<Rule>) -> FieldDecl {
        let loc = Loc::from(f.as_span());
        let mut pairs = f.into_inner();
        let id = pairs.next().unwrap();
        let name = self.name(&id);
        let var = LocalVar::new(id.as_str());
        let mut tele = Tele::default();
        let mut typ = None;
        let mut default = None;
        for p in pairs {
            match p.as_rule() {
                Rule::explicit_param | Rule::implicit_param | Rule::instance_param => {
                    tele.extend(self.param(p))
                }
                _ if typ.is_none() => typ = Some(self.expr(p)),
                _ => default = Some(self.expr(p)),
            }
        }
        let typ = Expr::pi(&tele, typ.unwrap());
        let default = default.map(|d| {
            tele.iter().rfold(d, |b, p| {
                Expr::Lam(b.loc(), p.clone(), Box::new(b))
            })
        });
        FieldDecl {
            loc,
            name,
            var,
            typ,
            default,
        }
    }

    fn instance_def(&mut self, i: Pair<Rule>) -> Decl {
        let loc = Loc::from(i.as_span());
        let mut pairs = i.into_inner();
        let name = self.name(&pairs.next().unwrap());
        let mut tele = Tele::default();
        let mut class = None;
        let mut impls = Vec::default();
        for p in pairs {
            match p.as_rule() {
                Rule::explicit_param | Rule::implicit_param | Rule::instance_param => {
                    tele.extend(self.param(p))
                }
                Rule::implementation => impls.push(self.implementation(p)),
                _ => class = Some(self.expr(p)),
            }
        }
        Decl {
            loc,
            name,
            tele,
            body: DeclBody::Instance {
                class: class.unwrap(),
                impls,
            },
        }
    }

    fn implementation(&mut self, i: Pair<Rule>) -> Implementation {
        let loc = Loc::from(i.as_span());
        let mut pairs = i.into_inner();
        let name = Ustr::from(pairs.next().unwrap().as_str());
        let body = self.expr(pairs.next().unwrap());
        Implementation { loc, name, body }
    }

    fn binder(p: &Pair<Rule>) -> LocalVar {
        match p.as_rule() {
            Rule::hole => LocalVar::unbound(),
            _ => LocalVar::new(p.as_str()),
        }
    }

    fn param(&mut self, p: Pair<Rule>) -> Tele<Expr> {
        let info = match p.as_rule() {
            Rule::explicit_param => Explicit,
            Rule::implicit_param => Implicit,
            Rule::instance_param => Instance,
            _ => unreachable!(),
        };
        let mut pairs = p.into_inner().collect::<Vec<_>>();
        let typ = self.expr(pairs.pop().unwrap());
        if pairs.is_empty() {
            return vec![Param::new(LocalVar::unbound(), info, typ)];
        }
        pairs
            .iter()
            .map(|v| Param::new(Self::binder(v), info, typ.clone()))
            .collect()
    }

    fn clause(&mut self, c: Pair<Rule>) -> Clause {
        let loc = Loc::from(c.as_span());
        let mut pats = Vec::default();
        let mut rhs = None;
        for p in c.into_inner() {
            match p.as_rule() {
                Rule::pat_app
                | Rule::pat_absurd
                | Rule::pat_wildcard
                | Rule::pat_num
                | Rule::pat_ident => pats.push(self.pattern(p)),
                _ => rhs = Some(self.expr(p)),
            }
        }
        Clause { loc, pats, rhs }
    }

    fn pattern(&mut self, p: Pair<Rule>) -> Pattern {
        let loc = Loc::from(p.as_span());
        match p.as_rule() {
            Rule::pat_app => {
                let mut pairs = p.into_inner();
                let head = Ustr::from(pairs.next().unwrap().as_str());
                Pattern::Unresolved(loc, head, pairs.map(|q| self.pattern(q)).collect())
            }
            Rule::pat_absurd => Pattern::Absurd(loc),
            Rule::pat_wildcard => Pattern::Var(loc, LocalVar::unbound()),
            Rule::pat_num => Pattern::Num(loc, self.number(&p)),
            Rule::pat_ident => Pattern::Unresolved(loc, Ustr::from(p.as_str()), Vec::default()),
            _ => unreachable!(),
        }
    }

    fn expr(&mut self, e: Pair<Rule>) -> Expr {
        use Expr::*;
        let loc = Loc::from(e.as_span());
        match e.as_rule() {
            Rule::lam_expr => {
                let mut pairs = e.into_inner().collect::<Vec<_>>();
                let body = self.expr(pairs.pop().unwrap());
                let mut params = Tele::default();
                for p in pairs {
                    match p.as_rule() {
                        Rule::lam_var => {
                            let v = p.into_inner().next().unwrap();
                            params.push(Param::new(Self::binder(&v), Explicit, Hole(loc)))
                        }
                        _ => params.extend(self.param(p)),
                    }
                }
                params
                    .into_iter()
                    .rfold(body, |b, p| Lam(loc, p, Box::new(b)))
            }
            Rule::pi_expr => {
                let mut pairs = e.into_inner().collect::<Vec<_>>();
                let body = self.expr(pairs.pop().unwrap());
                let params = pairs
                    .into_iter()
                    .flat_map(|p| self.param(p))
                    .collect::<Vec<_>>();
                params.into_iter().rfold(body, |b, p| Pi(loc, p, Box::new(b)))
            }
            Rule::sigma_expr => {
                let mut params = Vec::default();
                for p in e.into_inner() {
                    match p.as_rule() {
                        Rule::anon_param => {
                            let typ = self.expr(p.into_inner().next().unwrap());
                            params.push(Param::new(LocalVar::unbound(), Explicit, typ))
                        }
                        _ => params.extend(self.param(p)),
                    }
                }
                let last = params.pop().unwrap();
                params
                    .into_iter()
                    .rfold(*last.typ, |b, p| Sigma(loc, p, Box::new(b)))
            }
            Rule::let_expr => {
                let mut pairs = e.into_inner().collect::<Vec<_>>();
                let body = self.expr(pairs.pop().unwrap());
                let value = self.expr(pairs.pop().unwrap());
                let typ = if pairs.len() > 1 {
                    pairs.pop().map(|t| Box::new(self.expr(t)))
                } else {
                    None
                };
                let var = LocalVar::new(pairs[0].as_str());
                Let(loc, var, typ, Box::new(value), Box::new(body))
            }
            Rule::case_expr => {
                let mut pairs = e.into_inner();
                let scrut = self.expr(pairs.next().unwrap());
                let mut var = LocalVar::unbound();
                let mut ret = None;
                let mut clauses = Vec::default();
                for p in pairs {
                    match p.as_rule() {
                        Rule::case_as => {
                            var = LocalVar::new(p.into_inner().next().unwrap().as_str())
                        }
                        Rule::case_return => {
                            ret = Some(Box::new(self.expr(p.into_inner().next().unwrap())))
                        }
                        Rule::clause => clauses.push(self.clause(p)),
                        _ => unreachable!(),
                    }
                }
                Case(loc, Box::new(scrut), var, ret, clauses)
            }
            Rule::arrow_expr => {
                let mut pairs = e.into_inner();
                let dom = self.expr(pairs.next().unwrap());
                match pairs.next() {
                    Some(cod) => Pi(
                        loc,
                        Param::new(LocalVar::unbound(), Explicit, dom),
                        Box::new(self.expr(cod)),
                    ),
                    None => dom,
                }
            }
            Rule::app_expr => {
                let mut pairs = e.into_inner();
                let f = self.expr(pairs.next().unwrap());
                pairs.fold(f, |f, a| {
                    let (info, x) = match a.as_rule() {
                        Rule::implicit_arg => (
                            ParamInfo::Implicit,
                            self.expr(a.into_inner().next().unwrap()),
                        ),
                        _ => (ParamInfo::Explicit, self.expr(a)),
                    };
                    App(loc, Box::new(f), info, Box::new(x))
                })
            }
            Rule::proj_expr => {
                let mut pairs = e.into_inner();
                let a = self.expr(pairs.next().unwrap());
                pairs.fold(a, |a, p| {
                    let side = if p.as_str().ends_with('1') {
                        Side::Fst
                    } else {
                        Side::Snd
                    };
                    Proj(loc, Box::new(a), side)
                })
            }
            Rule::univ => {
                let mut levels = e.into_inner();
                let p = levels.next().map(|l| self.level(l, LevelSlot::Predicative));
                let h = levels.next().map(|l| self.level(l, LevelSlot::Homotopy));
                Univ(loc, p, h)
            }
            Rule::goal => Goal(loc),
            Rule::hole => Hole(loc),
            Rule::num => Num(loc, self.number(&e)),
            Rule::new_expr => {
                let mut pairs = e.into_inner();
                let class = self.expr(pairs.next().unwrap());
                let impls = pairs.map(|i| self.implementation(i)).collect();
                New(loc, Box::new(class), impls)
            }
            Rule::ident_ref => Unresolved(loc, Ustr::from(e.as_str())),
            Rule::tuple => {
                let mut pairs = e.into_inner();
                let a = self.expr(pairs.next().unwrap());
                let b = self.expr(pairs.next().unwrap());
                Expr::Pair(loc, Box::new(a), Box::new(b))
            }
            _ => unreachable!(),
        }
    }

    fn level(&mut self, l: Pair<Rule>, slot: LevelSlot) -> LevelExpr {
        use LevelSlot::*;
        let span = l.as_span();
        match (l.as_rule(), slot) {
            (Rule::level_num, _) => LevelExpr::Const(self.number(&l)),
            (Rule::level_lp, Predicative) | (Rule::level_lh, Homotopy) => {
                LevelExpr::Param { add: 0, max: 0 }
            }
            (Rule::level_lp, Homotopy) => {
                self.fail(span, "\\lp in a homotopy level".to_string());
                LevelExpr::Const(0)
            }
            (Rule::level_lh, Predicative) => {
                self.fail(span, "\\lh in a predicative level".to_string());
                LevelExpr::Const(0)
            }
            (Rule::level_inf, Homotopy) => LevelExpr::Inf,
            (Rule::level_inf, Predicative) => {
                self.fail(span, "\\oo is not a predicative level".to_string());
                LevelExpr::Const(0)
            }
            (Rule::level_suc, _) => {
                let l = self.level(l.into_inner().next().unwrap(), slot);
                l.suc().unwrap_or_else(|| {
                    self.fail(span, "level is too large".to_string());
                    l
                })
            }
            (Rule::level_max, _) => {
                let mut pairs = l.into_inner();
                let a = self.level(pairs.next().unwrap(), slot);
                let b = self.level(pairs.next().unwrap(), slot);
                a.max(b)
            }
            _ => unreachable!(),
        }
    }
}
