use std::mem::{replace, take};

use log::trace;

use crate::theory::abs::data::{MetaId, Term};
use crate::theory::abs::def::Env;
use crate::theory::abs::meta::MetaKind;
use crate::theory::conc::elab::{instantiate, Elaborator};
use crate::theory::{short_name, Loc, Name, ParamInfo, Tele};
use crate::Error;
use crate::Error::{AmbiguousInstance, NoInstanceFound};

/// An instance argument waiting for its class arguments to be known.
#[derive(Debug, Clone)]
pub struct Obligation {
    pub meta: MetaId,
    /// The context the argument was created in.
    pub ctx: Tele<Term>,
    pub values: Vec<Option<Term>>,
    pub loc: Loc,
}

impl Elaborator<'_> {
    /// Runs instance search for pending instance arguments. Unless `force`d,
    /// arguments whose class type still has metavariables are postponed.
    /// Returns whether anything was solved.
    pub(super) fn resolve_obligations(&mut self, force: bool) -> Result<bool, Error> {
        let mut progress = false;
        for ob in take(&mut self.obligations) {
            if self.metas.solution(ob.meta).is_some() {
                continue;
            }
            let goal = self.metas.zonk(&self.meta_goal(ob.meta));
            if !force && !goal.metas().is_empty() {
                self.obligations.push(ob);
                continue;
            }
            let ctx = replace(&mut self.ctx, ob.ctx);
            let values = replace(&mut self.values, ob.values);
            let ret = self.fill(ob.meta, &goal, ob.loc);
            self.ctx = ctx;
            self.values = values;
            ret?;
            progress = true;
        }
        Ok(progress)
    }

    /// The expected type of a metavariable, in its creation context.
    fn meta_goal(&self, m: MetaId) -> Term {
        let mv = self.metas.get(m);
        let mut t = &mv.typ;
        for _ in 0..mv.arity {
            if let Term::Pi(_, b) = t {
                t = b
            }
        }
        t.clone()
    }

    fn fill(&mut self, m: MetaId, goal: &Term, loc: Loc) -> Result<(), Error> {
        let n = self.ctx.len();
        let target = Term::app(Term::Meta(m), (0..n).rev().map(Term::Var));
        let sol = self.search(goal, loc, 0)?;
        self.unify(&target, &sol, loc)
    }

    /// Finds the instance of `goal`. A local instance wins over global ones;
    /// among global candidates exactly one may match.
    pub(super) fn search(&mut self, goal: &Term, loc: Loc, depth: usize) -> Result<Term, Error> {
        let (class, _, _) = self.class_type(goal, loc)?;
        if depth > self.config.instance_depth {
            return Err(NoInstanceFound {
                class: short_name(&class).to_string(),
                loc,
            });
        }
        trace!(target: "instance", "search {} (depth {depth})", self.show(goal));

        for (tm, ty) in self.local_instances(&class, loc)? {
            let snapshot = self.metas.clone();
            if self.unify(&ty, goal, loc).is_ok() {
                return Ok(tm);
            }
            self.metas = snapshot;
        }

        let env = Env::new(self.base, &self.own);
        let mut candidates = env
            .instances_of(&class)
            .into_iter()
            .map(|i| (i, Vec::default()))
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            candidates = self.inherited_instances(&class);
        }

        let mut found = Vec::default();
        for (inst, path) in candidates {
            let snapshot = self.metas.clone();
            match self.try_instance(inst, &path, goal, loc, depth) {
                Ok(tm) => found.push((inst, tm, replace(&mut self.metas, snapshot))),
                Err(e) => {
                    trace!(target: "instance", "{inst} rejected: {e}");
                    self.metas = snapshot
                }
            }
        }
        match found.len() {
            0 => Err(NoInstanceFound {
                class: short_name(&class).to_string(),
                loc,
            }),
            1 => {
                let (_, tm, metas) = found.remove(0);
                self.metas = metas;
                Ok(tm)
            }
            _ => Err(AmbiguousInstance {
                class: short_name(&class).to_string(),
                candidates: found
                    .iter()
                    .map(|(i, _, _)| short_name(i).to_string())
                    .collect(),
                loc,
            }),
        }
    }

    /// Instances of subclasses of `class`, each with the chain of hidden
    /// superclass fields leading back to `class`.
    fn inherited_instances(&self, class: &Name) -> Vec<(Name, Vec<(Name, usize)>)> {
        let env = Env::new(self.base, &self.own);
        let mut ret = Vec::default();
        let mut queue = vec![(*class, Vec::<(Name, usize)>::default())];
        let mut seen = vec![*class];
        while let Some((c, path)) = queue.pop() {
            for sub in env.subclasses_of(&c) {
                if seen.contains(&sub) {
                    continue;
                }
                seen.push(sub);
                let Some(index) = self
                    .class_fields(&sub)
                    .iter()
                    .position(|f| f.superclass == Some(c))
                else {
                    continue;
                };
                let mut path = path.clone();
                path.insert(0, (sub, index));
                ret.extend(env.instances_of(&sub).into_iter().map(|i| (i, path.clone())));
                queue.push((sub, path));
            }
        }
        ret
    }

    /// Applies a global instance to fresh arguments, projects it along `path`,
    /// matches it against `goal` and then searches for its own instance
    /// arguments.
    fn try_instance(
        &mut self,
        inst: Name,
        path: &[(Name, usize)],
        goal: &Term,
        loc: Loc,
        depth: usize,
    ) -> Result<Term, Error> {
        let (mut tm, mut ty) = self.global(inst, loc)?;
        let mut pending = Vec::default();
        while let Term::Pi(q, cod) = self.whnf(&ty, loc)? {
            let kind = match q.info {
                ParamInfo::Instance => MetaKind::Instance(self.class_type(&q.typ, loc)?.0),
                _ => MetaKind::Implicit,
            };
            let arg = self.fresh(*q.typ.clone(), kind, loc);
            if q.info == ParamInfo::Instance {
                pending.push((arg.clone(), *q.typ.clone()));
            }
            ty = cod.subst(&arg);
            tm = Term::App(Box::new(tm), Box::new(arg));
        }
        for (class, index) in path {
            let (c, s, ps) = self.class_type(&ty, loc)?;
            debug_assert_eq!(c, *class);
            let prev = (0..*index)
                .map(|j| Term::Field(Box::new(tm.clone()), c, j))
                .collect::<Vec<_>>();
            let field = self.class_fields(&c)[*index].typ.clone();
            ty = instantiate(&field, &s, &ps, &prev);
            tm = Term::Field(Box::new(tm), c, *index);
        }
        self.unify(&ty, goal, loc)?;
        for (arg, typ) in pending {
            let typ = self.metas.zonk(&typ);
            let sol = self.search(&typ, loc, depth + 1)?;
            self.unify(&arg, &sol, loc)?;
        }
        Ok(tm)
    }

    /// Instance parameters in scope that provide `class`, directly or through
    /// their superclass fields.
    fn local_instances(&mut self, class: &Name, loc: Loc) -> Result<Vec<(Term, Term)>, Error> {
        let n = self.ctx.len();
        let mut ret = Vec::default();
        for pos in (0..n).rev() {
            if self.ctx[pos].info != ParamInfo::Instance {
                continue;
            }
            let i = n - 1 - pos;
            let ty = self.ctx[pos].typ.lift(i + 1);
            let mut queue = vec![(Term::Var(i), ty)];
            while let Some((tm, ty)) = queue.pop() {
                let (c, s, ps) = match self.whnf(&ty, loc)? {
                    Term::ClassType(c, s, ps) => (c, s, ps),
                    _ => continue,
                };
                if c == *class {
                    ret.push((tm, ty));
                    continue;
                }
                let fields = self.class_fields(&c);
                for (k, f) in fields.iter().enumerate() {
                    if f.superclass.is_none() {
                        continue;
                    }
                    let prev = (0..k)
                        .map(|j| Term::Field(Box::new(tm.clone()), c, j))
                        .collect::<Vec<_>>();
                    queue.push((
                        Term::Field(Box::new(tm.clone()), c, k),
                        instantiate(&f.typ, &s, &ps, &prev),
                    ));
                }
            }
        }
        Ok(ret)
    }
}

