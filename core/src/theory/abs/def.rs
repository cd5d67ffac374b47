use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::cache::ContentHash;
use crate::theory::abs::data::{Sort, Term};
use crate::theory::{short_name, Loc, Name, Param, Tele};

/// Primitive definitions whose computation rules live in the normalizer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Prim {
    Nat,
    Zero,
    Suc,
    NatRec,
    Interval,
    Left,
    Right,
    Path,
    PathLam,
    At,
}

impl Prim {
    /// Number of arguments needed before the primitive takes its canonical
    /// form.
    pub fn arity(&self) -> usize {
        use Prim::*;
        match self {
            Nat | Zero | Interval | Left | Right => 0,
            Suc => 1,
            PathLam => 2,
            Path => 3,
            NatRec => 4,
            At => 5,
        }
    }
}

/// A class field. Its type lives under the class parameters followed by the
/// preceding fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassField {
    pub name: Name,
    pub typ: Term,
    pub default: Option<Term>,
    /// Set for the hidden field holding a superclass instance.
    pub superclass: Option<Name>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    Fn {
        body: Term,
        /// The structurally decreasing parameter of a recursive function.
        decreasing: Option<usize>,
    },
    Data {
        ctors: Vec<Name>,
    },
    Ctor {
        data: Name,
        index: usize,
        /// Leading implicit parameters: the data parameters, or the pattern
        /// variables of a guarded constructor.
        params: usize,
        /// Index patterns under the pattern variables, one per data
        /// parameter.
        pats: Option<Vec<Term>>,
    },
    Class {
        fields: Vec<ClassField>,
        supers: Vec<Name>,
    },
    Field {
        class: Name,
        index: usize,
    },
    Instance {
        class: Name,
        body: Term,
    },
    Prim(Prim),
    /// A definition whose body is still being elaborated.
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Def {
    pub loc: Loc,
    pub name: Name,
    pub tele: Tele<Term>,
    pub ret: Box<Term>,
    pub body: Body,
    /// Other globals referenced by the type or the body, sorted.
    pub deps: Vec<Name>,
    pub hash: ContentHash,
}

impl Def {
    pub fn new(loc: Loc, name: Name, tele: Tele<Term>, ret: Term, body: Body) -> Self {
        Self {
            loc,
            name,
            tele,
            ret: Box::new(ret),
            body,
            deps: Default::default(),
            hash: Default::default(),
        }
    }

    pub fn to_type(&self, s: &Sort) -> Term {
        Term::pi(&self.tele, *self.ret.clone()).subst_levels(s)
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self.body, Body::Undefined)
    }

    /// Collects the dependency set from the elaborated type and body.
    pub fn collect_deps(&mut self) {
        let mut deps = Vec::default();
        for p in &self.tele {
            p.typ.refs(&mut deps);
        }
        self.ret.refs(&mut deps);
        match &self.body {
            Body::Fn { body, .. } | Body::Instance { body, .. } => body.refs(&mut deps),
            Body::Data { ctors } => deps.extend(ctors.iter().copied()),
            Body::Ctor { data, pats, .. } => {
                pats.iter().flatten().for_each(|p| p.refs(&mut deps));
                deps.push(*data)
            }
            Body::Class { fields, supers } => {
                for f in fields {
                    f.typ.refs(&mut deps);
                    if let Some(d) = &f.default {
                        d.refs(&mut deps)
                    }
                }
                deps.extend(supers.iter().copied())
            }
            Body::Field { class, .. } => deps.push(*class),
            Body::Prim(_) | Body::Undefined => {}
        }
        deps.retain(|n| *n != self.name);
        deps.sort();
        deps.dedup();
        self.deps = deps;
    }
}

impl Display for Def {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use Body::*;
        let name = short_name(&self.name);
        let tele = Param::tele_to_string(&self.tele);
        match &self.body {
            Fn { body, .. } => write!(f, "\\func {name} {tele} : {} => {body}", self.ret),
            Data { ctors } => write!(
                f,
                "\\data {name} {tele} {}",
                ctors
                    .iter()
                    .map(|c| format!("| {}", short_name(c)))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Ctor { .. } => write!(f, "\\cons {name} {tele} : {}", self.ret),
            Class { fields, .. } => write!(
                f,
                "\\class {name} {tele} {{ {} }}",
                fields
                    .iter()
                    .map(|fd| format!("| {} : {}", short_name(&fd.name), fd.typ))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Field { .. } => write!(f, "\\field {name} {tele} : {}", self.ret),
            Instance { body, .. } => write!(f, "\\instance {name} {tele} : {} => {body}", self.ret),
            Prim(_) => write!(f, "\\prim {name} {tele} : {}", self.ret),
            Undefined => write!(f, "\\func {name} {tele} : {}", self.ret),
        }
    }
}

/// The global definition registry.
#[derive(Debug, Clone, Default)]
pub struct Sigma {
    defs: HashMap<Name, Def>,
    instances: HashMap<Name, Vec<Name>>,
    subclasses: HashMap<Name, Vec<Name>>,
}

impl Sigma {
    pub fn get(&self, n: &Name) -> Option<&Def> {
        self.defs.get(n)
    }

    pub fn contains(&self, n: &Name) -> bool {
        self.defs.contains_key(n)
    }

    pub fn insert(&mut self, d: Def) {
        match &d.body {
            Body::Instance { class, .. } => {
                let is = self.instances.entry(*class).or_default();
                if !is.contains(&d.name) {
                    is.push(d.name)
                }
            }
            Body::Class { supers, .. } => {
                for s in supers {
                    let cs = self.subclasses.entry(*s).or_default();
                    if !cs.contains(&d.name) {
                        cs.push(d.name)
                    }
                }
            }
            _ => {}
        }
        self.defs.insert(d.name, d);
    }

    pub fn remove(&mut self, n: &Name) -> Option<Def> {
        let d = self.defs.remove(n)?;
        match &d.body {
            Body::Instance { class, .. } => {
                if let Some(is) = self.instances.get_mut(class) {
                    is.retain(|i| i != n)
                }
            }
            Body::Class { supers, .. } => {
                for s in supers {
                    if let Some(cs) = self.subclasses.get_mut(s) {
                        cs.retain(|c| c != n)
                    }
                }
            }
            _ => {}
        }
        Some(d)
    }

    /// Global instances of a class, in registration order.
    pub fn instances_of(&self, class: &Name) -> &[Name] {
        self.instances.get(class).map_or(&[], |v| v.as_slice())
    }

    /// Classes directly extending `class`.
    pub fn subclasses_of(&self, class: &Name) -> &[Name] {
        self.subclasses.get(class).map_or(&[], |v| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Def> {
        self.defs.values()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// The definitions of the module being checked, layered over the shared
/// registry.
#[derive(Debug, Copy, Clone)]
pub struct Env<'a> {
    base: &'a Sigma,
    own: Option<&'a Sigma>,
}

impl<'a> Env<'a> {
    pub fn new(base: &'a Sigma, own: &'a Sigma) -> Self {
        Self {
            base,
            own: Some(own),
        }
    }

    pub fn get(&self, n: &Name) -> Option<&'a Def> {
        self.own.and_then(|o| o.get(n)).or_else(|| self.base.get(n))
    }

    fn both(&self, f: impl Fn(&'a Sigma) -> &'a [Name]) -> Vec<Name> {
        let mut ret = f(self.base).to_vec();
        if let Some(o) = self.own {
            ret.extend(f(o).iter().filter(|n| !self.base.contains(n)));
        }
        ret
    }

    pub fn instances_of(&self, class: &Name) -> Vec<Name> {
        self.both(|s| s.instances_of(class))
    }

    pub fn subclasses_of(&self, class: &Name) -> Vec<Name> {
        self.both(|s| s.subclasses_of(class))
    }
}

impl<'a> From<&'a Sigma> for Env<'a> {
    fn from(base: &'a Sigma) -> Self {
        Self { base, own: None }
    }
}
