use ustr::Ustr;

use crate::theory::abs::data::{ClauseHead, Side, Term};
use crate::theory::{short_name, Param};

/// Renders core terms back into surface-like syntax, naming bound variables
/// from their binder hints.
#[derive(Default)]
pub struct Printer {
    names: Vec<Ustr>,
}

impl Printer {
    pub fn new(names: Vec<Ustr>) -> Self {
        Self { names }
    }

    pub fn term(&mut self, tm: &Term) -> String {
        crate::maybe_grow(move || self.term_impl(tm))
    }

    fn var(&self, i: usize) -> String {
        match self.names.len().checked_sub(i + 1) {
            Some(k) => {
                let n = self.names[k];
                let shadowed = self.names[k + 1..].contains(&n);
                if shadowed || n == "_" {
                    format!("{n}#{i}")
                } else {
                    n.to_string()
                }
            }
            None => format!("#{i}"),
        }
    }

    fn under<R>(&mut self, names: impl IntoIterator<Item = Ustr>, f: impl FnOnce(&mut Self) -> R) -> R {
        let len = self.names.len();
        self.names.extend(names);
        let ret = f(self);
        self.names.truncate(len);
        ret
    }

    fn binder(&mut self, p: &Param<Term>) -> String {
        let typ = self.term(&p.typ);
        p.info.wrap(format!("{} : {typ}", p.var.name))
    }

    fn atom(&mut self, tm: &Term) -> String {
        use Term::*;
        let s = self.term(tm);
        match tm {
            Univ(_) | Var(_) | Meta(_) | Nat | Zero | Interval | Left | Right | Pair(_, _)
            | Proj(_, _) | Field(_, _, _) => s,
            Ref(_, _) | Data(_, _, _) | ClassType(_, _, _) if !s.contains(' ') => s,
            Con(_, _, _, xs) if xs.is_empty() => s,
            Suc(_) if tm.as_nat().is_some() => s,
            _ => format!("({s})"),
        }
    }

    fn apps(&mut self, head: String, args: &[Term]) -> String {
        let mut s = head;
        for a in args {
            s.push(' ');
            s.push_str(&self.atom(a));
        }
        s
    }

    fn term_impl(&mut self, tm: &Term) -> String {
        use Term::*;
        match tm {
            Univ(s) => format!("\\Type {s}"),
            Var(i) => self.var(*i),
            Ref(n, _) => short_name(n).to_string(),
            Meta(m) => format!("?{m}"),
            Lam(p, b) => {
                let v = p.var.name;
                let b = self.under([v], |s| s.term(b));
                format!("\\lam {v} => {b}")
            }
            Pi(p, b) => {
                let binder = self.binder(p);
                let b = self.under([p.var.name], |s| s.term(b));
                if p.is_explicit() && !tm_uses_binder(tm) {
                    format!("{} -> {b}", self.atom(&p.typ))
                } else {
                    format!("\\Pi {binder} -> {b}")
                }
            }
            App(_, _) => {
                let (f, args) = tm.spine();
                let head = self.atom(f);
                let args = args.into_iter().cloned().collect::<Vec<_>>();
                self.apps(head, &args)
            }
            Let(p, a, b) => {
                let a = self.term(a);
                let v = p.var.name;
                let b = self.under([v], |s| s.term(b));
                format!("\\let {v} := {a} \\in {b}")
            }
            Sigma(p, b) => {
                let binder = self.binder(p);
                let b = self.under([p.var.name], |s| s.term(b));
                format!("\\Sigma {binder} {b}")
            }
            Pair(a, b) => format!("({}, {})", self.term(a), self.term(b)),
            Proj(a, s) => {
                let a = self.atom(a);
                match s {
                    Side::Fst => format!("{a}.1"),
                    Side::Snd => format!("{a}.2"),
                }
            }
            Data(n, _, ps) | ClassType(n, _, ps) => self.apps(short_name(n).to_string(), ps),
            Con(n, _, _, xs) => self.apps(short_name(n).to_string(), xs),
            Case(cs) => {
                let scrut = self.term(&cs.scrut);
                let clauses = cs
                    .clauses
                    .iter()
                    .map(|cl| {
                        let head = match cl.head {
                            ClauseHead::Con(n) => short_name(&n).to_string(),
                            ClauseHead::Zero => "zero".to_string(),
                            ClauseHead::Suc => "suc".to_string(),
                        };
                        let pat = cl
                            .binders
                            .iter()
                            .fold(head, |s, b| format!("{s} {b}"));
                        let body = self.under(cl.binders.iter().copied(), |s| s.term(&cl.body));
                        format!("| {pat} => {body}")
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("\\case {scrut} \\with {{ {clauses} }}")
            }
            New(n, _, _, fs) => {
                let fs = fs
                    .iter()
                    .map(|f| format!("| {}", self.term(f)))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("\\new {} {{ {fs} }}", short_name(n))
            }
            Field(a, n, i) => format!("{}.{}#{i}", self.atom(a), short_name(n)),
            Nat => "Nat".to_string(),
            Zero => "0".to_string(),
            Suc(a) => match tm.as_nat() {
                Some(n) => n.to_string(),
                None => format!("suc {}", self.atom(a)),
            },
            NatRec(r) => {
                let args = [r.zero.clone(), r.succ.clone(), r.target.clone()];
                self.apps("Nat.rec".to_string(), &args)
            }
            Interval => "I".to_string(),
            Left => "left".to_string(),
            Right => "right".to_string(),
            Path(a, x, y) => {
                let args = [a.as_ref().clone(), x.as_ref().clone(), y.as_ref().clone()];
                self.apps("Path".to_string(), &args)
            }
            PathLam(f) => format!("path {}", self.atom(f)),
            At(a) => {
                let args = [a.path.clone(), a.point.clone()];
                self.apps("at".to_string(), &args)
            }
        }
    }
}

fn tm_uses_binder(tm: &Term) -> bool {
    match tm {
        Term::Pi(_, b) => b.has_var(0),
        _ => true,
    }
}
