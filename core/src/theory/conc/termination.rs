use log::trace;

use crate::theory::abs::data::Term;
use crate::theory::{short_name, Loc, Name};
use crate::Error;
use crate::Error::NonTerminationRejected;

/// What a bound variable is known to be, relative to the function
/// parameters.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Rel {
    Param(usize),
    Below(usize),
    Unknown,
}

impl Rel {
    fn origin(&self) -> Option<usize> {
        match self {
            Rel::Param(k) | Rel::Below(k) => Some(*k),
            Rel::Unknown => None,
        }
    }
}

struct Calls {
    f: Name,
    arity: usize,
    /// Indexed by de Bruijn level.
    rels: Vec<Rel>,
    /// For every recursive call, which parameters strictly decrease.
    calls: Vec<Vec<bool>>,
}

impl Calls {
    fn rel(&self, i: usize) -> Rel {
        self.rels
            .len()
            .checked_sub(i + 1)
            .map_or(Rel::Unknown, |l| self.rels[l])
    }

    fn under(&mut self, rels: impl IntoIterator<Item = Rel>, tm: &Term) {
        let len = self.rels.len();
        self.rels.extend(rels);
        self.term(tm);
        self.rels.truncate(len);
    }

    fn call(&mut self, args: &[&Term]) {
        let decreasing = (0..self.arity)
            .map(|k| match args.get(k) {
                Some(Term::Var(i)) => self.rel(*i) == Rel::Below(k),
                _ => false,
            })
            .collect();
        self.calls.push(decreasing)
    }

    fn term(&mut self, tm: &Term) {
        crate::maybe_grow(move || self.term_impl(tm))
    }

    fn term_impl(&mut self, tm: &Term) {
        use Term::*;
        match tm {
            App(..) => {
                let (head, args) = tm.spine();
                match head {
                    Ref(n, _) if *n == self.f => self.call(&args),
                    h => self.term(h),
                }
                for a in args {
                    self.term(a)
                }
            }
            Ref(n, _) if *n == self.f => self.call(&[]),
            Lam(p, b) | Pi(p, b) | Sigma(p, b) => {
                self.term(&p.typ);
                self.under([Rel::Unknown], b)
            }
            Let(p, a, b) => {
                self.term(&p.typ);
                self.term(a);
                self.under([Rel::Unknown], b)
            }
            Case(cs) => {
                self.term(&cs.scrut);
                self.under([Rel::Unknown], &cs.motive);
                let below = match &cs.scrut {
                    Var(i) => self.rel(*i).origin().map_or(Rel::Unknown, Rel::Below),
                    _ => Rel::Unknown,
                };
                for cl in &cs.clauses {
                    self.under(vec![below; cl.arity()], &cl.body)
                }
            }
            Pair(a, b) => {
                self.term(a);
                self.term(b)
            }
            Proj(a, _) | Field(a, _, _) | Suc(a) | PathLam(a) => self.term(a),
            Data(_, _, ps) | ClassType(_, _, ps) => ps.iter().for_each(|t| self.term(t)),
            Con(_, _, ps, xs) | New(_, _, ps, xs) => {
                ps.iter().for_each(|t| self.term(t));
                xs.iter().for_each(|t| self.term(t))
            }
            NatRec(r) => {
                for t in [&r.motive, &r.zero, &r.succ, &r.target] {
                    self.term(t)
                }
            }
            Path(a, x, y) => {
                for t in [a, x, y] {
                    self.term(t)
                }
            }
            At(a) => {
                for t in [&a.lhs, &a.rhs, &a.path, &a.point] {
                    self.term(t)
                }
            }
            Univ(_) | Var(_) | Ref(..) | Meta(_) | Nat | Zero | Interval | Left | Right => {}
        }
    }
}

/// Finds a parameter that strictly decreases in every recursive call of `f`,
/// whose body lives under its `arity` parameters. Non-recursive functions
/// need none.
pub fn decreasing(f: Name, arity: usize, body: &Term, loc: Loc) -> Result<Option<usize>, Error> {
    let mut c = Calls {
        f,
        arity,
        rels: (0..arity).map(Rel::Param).collect(),
        calls: Default::default(),
    };
    c.term(body);
    if c.calls.is_empty() {
        return Ok(None);
    }
    trace!(target: "termination", "{f}: {:?}", c.calls);
    (0..arity)
        .find(|k| c.calls.iter().all(|call| call[*k]))
        .map(Some)
        .ok_or_else(|| NonTerminationRejected(short_name(&f).to_string(), loc))
}
