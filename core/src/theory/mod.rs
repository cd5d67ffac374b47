use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use pest::Span;
use serde::{Deserialize, Serialize};
use ustr::Ustr;

pub mod abs;
pub mod conc;
pub mod surf;

/// Qualified name of a global definition, e.g. `Prelude::plus`.
pub type Name = Ustr;

pub const MODULE_SEP: &str = "::";

pub fn qualify(module: &str, name: &str) -> Name {
    Ustr::from(format!("{module}{MODULE_SEP}{name}").as_str())
}

/// The part of a qualified name after the module path.
pub fn short_name(n: &Name) -> &str {
    let s = n.as_str();
    s.rsplit_once(MODULE_SEP).map_or(s, |(_, r)| r)
}

pub fn module_of(n: &Name) -> &str {
    let s = n.as_str();
    s.rsplit_once(MODULE_SEP).map_or("", |(m, _)| m)
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub line: usize,
    pub col: usize,
    pub start: usize,
    pub end: usize,
}

impl Loc {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end.max(self.start + 1)
    }
}

impl Display for Loc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl<'a> From<Span<'a>> for Loc {
    fn from(span: Span) -> Self {
        let (line, col) = span.start_pos().line_col();
        Loc {
            line,
            col,
            start: span.start(),
            end: span.end(),
        }
    }
}

static NEXT_LOCAL: AtomicUsize = AtomicUsize::new(1);

/// A local binding site. Identity is the `id`; the name is only a hint.
#[derive(Clone, Serialize, Deserialize)]
pub struct LocalVar {
    #[serde(skip)]
    id: usize,
    pub name: Ustr,
}

impl LocalVar {
    pub fn new(name: &str) -> Self {
        Self {
            id: NEXT_LOCAL.fetch_add(1, Ordering::Relaxed),
            name: Ustr::from(name),
        }
    }

    /// A name hint for core binders, which carry no identity.
    pub fn hint(name: &str) -> Self {
        Self {
            id: 0,
            name: Ustr::from(name),
        }
    }

    pub fn unbound() -> Self {
        Self::new("_")
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn as_str(&self) -> &str {
        self.name.as_str()
    }
}

impl PartialEq for LocalVar {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LocalVar {}

impl Hash for LocalVar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl Debug for LocalVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

impl Display for LocalVar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name.as_str())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ParamInfo {
    Explicit,
    Implicit,
    Instance,
}

impl ParamInfo {
    pub fn wrap(&self, s: String) -> String {
        match self {
            ParamInfo::Explicit => format!("({s})"),
            ParamInfo::Implicit => format!("{{{s}}}"),
            ParamInfo::Instance => format!("[{s}]"),
        }
    }
}

pub trait Syntax: Display {}

/// A binder. Equality and hashing ignore the variable: binders are compared
/// up to renaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param<T: Syntax> {
    pub var: LocalVar,
    pub info: ParamInfo,
    pub typ: Box<T>,
}

impl<T: Syntax> Param<T> {
    pub fn new(var: LocalVar, info: ParamInfo, typ: T) -> Self {
        Self {
            var,
            info,
            typ: Box::new(typ),
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.info == ParamInfo::Explicit
    }

    pub fn tele_to_string(tele: &Tele<T>) -> String {
        tele.iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<T: Syntax + PartialEq> PartialEq for Param<T> {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info && self.typ == other.typ
    }
}

impl<T: Syntax + Eq> Eq for Param<T> {}

impl<T: Syntax + Hash> Hash for Param<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.info.hash(state);
        self.typ.hash(state)
    }
}

impl<T: Syntax> Display for Param<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.info.wrap(format!("{} : {}", self.var, self.typ)))
    }
}

pub type Tele<T> = Vec<Param<T>>;
