use std::collections::HashMap;

use ustr::Ustr;

use crate::theory::abs::data::{Level, LevelVar, MetaId, Sort, Term};
use crate::theory::abs::level::LevelGraph;
use crate::theory::{Loc, Name, Param};
use crate::Error;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MetaKind {
    /// An inserted implicit argument or `_`.
    Implicit,
    /// An instance argument, resolved by instance search.
    Instance(Name),
    /// A `{?}` goal.
    Goal,
}

#[derive(Debug, Clone)]
pub struct MetaVar {
    pub loc: Loc,
    pub kind: MetaKind,
    /// Closed Pi over the creation context.
    pub typ: Term,
    pub arity: usize,
    /// Names of the creation context, for display.
    pub names: Vec<Ustr>,
    /// Closed lambda of `arity` binders.
    pub solution: Option<Term>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Cmp {
    Eq,
    Le,
}

/// A unification problem outside the pattern fragment, kept for later.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub lhs: Term,
    pub rhs: Term,
    pub cmp: Cmp,
    pub locals: Vec<Option<Term>>,
    pub loc: Loc,
}

/// Per-definition metavariable state. Cloning takes a snapshot, which is how
/// instance search backtracks.
#[derive(Debug, Clone, Default)]
pub struct Metas {
    metas: Vec<MetaVar>,
    level_count: usize,
    p_levels: Vec<MetaId>,
    h_levels: Vec<MetaId>,
    level_solutions: HashMap<MetaId, Level>,
    pub constraints: Vec<Constraint>,
    pub p: LevelGraph,
    pub h: LevelGraph,
}

impl Metas {
    /// Creates a metavariable of type `typ` in the context `ctx` (outermost
    /// first) and returns it applied to every variable of that context.
    pub fn fresh(&mut self, ctx: &[Param<Term>], typ: Term, kind: MetaKind, loc: Loc) -> Term {
        let m = self.metas.len();
        self.metas.push(MetaVar {
            loc,
            kind,
            typ: Term::pi(&ctx.to_vec(), typ),
            arity: ctx.len(),
            names: ctx.iter().map(|p| p.var.name).collect(),
            solution: None,
        });
        let n = ctx.len();
        Term::app(Term::Meta(m), (0..n).rev().map(Term::Var))
    }

    fn fresh_level(&mut self) -> MetaId {
        let m = self.level_count;
        self.level_count += 1;
        m
    }

    pub fn fresh_sort(&mut self) -> Sort {
        let p = self.fresh_level();
        let h = self.fresh_level();
        self.p_levels.push(p);
        self.h_levels.push(h);
        Sort::new(Level::meta(p), Level::meta(h))
    }

    pub fn get(&self, m: MetaId) -> &MetaVar {
        &self.metas[m]
    }

    pub fn solution(&self, m: MetaId) -> Option<&Term> {
        self.metas.get(m).and_then(|v| v.solution.as_ref())
    }

    pub fn solve(&mut self, m: MetaId, sol: Term) {
        self.metas[m].solution = Some(sol)
    }

    pub fn len(&self) -> usize {
        self.metas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetaId, &MetaVar)> {
        self.metas.iter().enumerate()
    }

    pub fn unsolved(&self) -> impl Iterator<Item = (MetaId, &MetaVar)> {
        self.iter().filter(|(_, v)| v.solution.is_none())
    }

    /// Solves both level graphs, assigning every level metavariable.
    pub fn solve_levels(&mut self) -> Result<(), Error> {
        let mut sols = self.p.solve(&self.p_levels)?;
        sols.extend(self.h.solve(&self.h_levels)?);
        self.level_solutions = sols;
        Ok(())
    }

    pub fn zonk(&self, tm: &Term) -> Term {
        tm.zonk(&|m| self.solution(m).cloned(), &|m| {
            self.level_solutions.get(&m).copied()
        })
    }

    pub fn zonk_level(&self, l: &Level) -> Level {
        match l.meta_var() {
            Some(m) => match self.level_solutions.get(&m) {
                Some(sol) => l.subst(LevelVar::Meta(m), sol),
                None => *l,
            },
            None => *l,
        }
    }
}
