use std::io;
use std::ops::Range;
use std::path::Path;

use ariadne::{Color, Label, Report, ReportKind};
use pest::error::{InputLocation, LineColLocation};
use strum::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

use crate::theory::Loc;

pub mod cache;
pub mod config;
pub mod driver;
pub mod prelude;
#[cfg(test)]
mod tests;
pub mod theory;

pub use crate::config::Config;
pub use crate::driver::{Driver, ModuleReport, ModuleStatus};
pub use crate::theory::conc::load::Source;
pub use crate::theory::surf::Rule;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error")]
    IO(#[from] io::Error),
    #[error("parse error")]
    Parsing(#[from] Box<pest::error::Error<Rule>>),

    #[error("unresolved name \"{0}\"")]
    UnresolvedName(String, Loc),
    #[error("duplicate name \"{0}\"")]
    DuplicateName(String, Loc),
    #[error("unknown module \"{0}\"")]
    UnknownModule(String, Loc),

    #[error("expected \"{expected}\", got \"{actual}\"")]
    TypeMismatch {
        expected: String,
        actual: String,
        loc: Loc,
    },
    #[error("expected a type, got \"{0}\"")]
    NotAType(String, Loc),
    #[error("expected a function, got \"{0}\"")]
    NotAFunction(String, Loc),

    #[error("unsolved metavariable of type \"{0}\"")]
    UnsolvedMetavariable(String, Loc),
    #[error("unsolved constraint \"{0}\"")]
    UnsolvedConstraint(String, Loc),
    #[error("goal \"{expected}\"")]
    Goal {
        expected: String,
        context: Vec<(String, String)>,
        loc: Loc,
    },
    #[error("inconsistent levels: {0}")]
    LevelInconsistency(String, Loc),

    #[error("missing clauses: {}", .missing.join(", "))]
    NonExhaustiveMatch { missing: Vec<String>, loc: Loc },
    #[error("ambiguous instances of \"{class}\": {}", .candidates.join(", "))]
    AmbiguousInstance {
        class: String,
        candidates: Vec<String>,
        loc: Loc,
    },
    #[error("no instance of \"{class}\"")]
    NoInstanceFound { class: String, loc: Loc },
    #[error("\"{0}\" is not structurally recursive")]
    NonTerminationRejected(String, Loc),

    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("\"{name}\" depends on failed \"{failed}\"")]
    DependencyFailed {
        name: String,
        failed: String,
        loc: Loc,
    },
    #[error("corrupt cache entry: {0}")]
    CacheCorrupt(String),
    #[error("reduction limit exceeded")]
    ReductionLimit(Loc),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum ErrorKind {
    IO,
    ParseDeferred,
    NameResolution,
    TypeMismatch,
    UnsolvedMetavariable,
    UnsolvedConstraint,
    Goal,
    LevelInconsistency,
    NonExhaustiveMatch,
    AmbiguousInstance,
    NoInstanceFound,
    NonTerminationRejected,
    DependencyCycle,
    DependencyFailed,
    CacheCorrupt,
    ReductionLimit,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            IO(_) => ErrorKind::IO,
            Parsing(_) => ErrorKind::ParseDeferred,
            UnresolvedName(..) | DuplicateName(..) | UnknownModule(..) => ErrorKind::NameResolution,
            TypeMismatch { .. } | NotAType(..) | NotAFunction(..) => ErrorKind::TypeMismatch,
            UnsolvedMetavariable(..) => ErrorKind::UnsolvedMetavariable,
            UnsolvedConstraint(..) => ErrorKind::UnsolvedConstraint,
            Goal { .. } => ErrorKind::Goal,
            LevelInconsistency(..) => ErrorKind::LevelInconsistency,
            NonExhaustiveMatch { .. } => ErrorKind::NonExhaustiveMatch,
            AmbiguousInstance { .. } => ErrorKind::AmbiguousInstance,
            NoInstanceFound { .. } => ErrorKind::NoInstanceFound,
            NonTerminationRejected(..) => ErrorKind::NonTerminationRejected,
            DependencyCycle(_) => ErrorKind::DependencyCycle,
            DependencyFailed { .. } => ErrorKind::DependencyFailed,
            CacheCorrupt(_) => ErrorKind::CacheCorrupt,
            ReductionLimit(_) => ErrorKind::ReductionLimit,
        }
    }

    pub fn loc(&self) -> Option<Loc> {
        use Error::*;
        Some(match self {
            IO(_) | DependencyCycle(_) | CacheCorrupt(_) => return None,
            Parsing(e) => {
                let (start, end) = match e.location {
                    InputLocation::Pos(p) => (p, p),
                    InputLocation::Span(s) => s,
                };
                let (line, col) = match e.line_col {
                    LineColLocation::Pos(p) | LineColLocation::Span(p, _) => p,
                };
                Loc {
                    line,
                    col,
                    start,
                    end,
                }
            }
            UnresolvedName(_, loc)
            | DuplicateName(_, loc)
            | UnknownModule(_, loc)
            | NotAType(_, loc)
            | NotAFunction(_, loc)
            | UnsolvedMetavariable(_, loc)
            | UnsolvedConstraint(_, loc)
            | LevelInconsistency(_, loc)
            | NonTerminationRejected(_, loc)
            | ReductionLimit(loc) => *loc,
            TypeMismatch { loc, .. }
            | Goal { loc, .. }
            | NonExhaustiveMatch { loc, .. }
            | AmbiguousInstance { loc, .. }
            | NoInstanceFound { loc, .. }
            | DependencyFailed { loc, .. } => *loc,
        })
    }

    fn note(&self) -> Option<String> {
        match self {
            Error::Parsing(e) => Some(e.variant.message().to_string()),
            Error::Goal { context, .. } if !context.is_empty() => Some(
                context
                    .iter()
                    .map(|(x, t)| format!("{x} : {t}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Warning {
    #[error("redundant clause")]
    RedundantClause(Loc),
}

impl Warning {
    pub fn loc(&self) -> Loc {
        match self {
            Warning::RedundantClause(loc) => *loc,
        }
    }
}

fn report(kind: ReportKind, msg: String, note: Option<String>, loc: Option<Loc>, path: &Path, src: &str) {
    let file = path.to_string_lossy().to_string();
    let range = loc.map_or(0..0, |l| l.range());
    let mut r = Report::<(String, Range<usize>)>::build(kind, file.clone(), range.start)
        .with_message(&msg);
    if loc.is_some() {
        r = r.with_label(
            Label::new((file.clone(), range))
                .with_message(&msg)
                .with_color(Color::Red),
        );
    }
    if let Some(n) = note {
        r = r.with_note(n);
    }
    r.finish()
        .eprint((file, ariadne::Source::from(src.to_string())))
        .unwrap_or_default();
}

/// Renders the error against its source and hands it back.
pub fn print_err(e: Error, path: &Path, src: &str) -> Error {
    show_err(&e, path, src);
    e
}

pub fn show_err(e: &Error, path: &Path, src: &str) {
    report(ReportKind::Error, e.to_string(), e.note(), e.loc(), path, src)
}

pub fn print_warn(w: &Warning, path: &Path, src: &str) {
    report(ReportKind::Warning, w.to_string(), None, Some(w.loc()), path, src)
}

const RED_ZONE: usize = 512 * 1024;
const STACK_PER_RECURSION: usize = 4 * 1024 * 1024;

pub fn maybe_grow<R, F: FnOnce() -> R>(f: F) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
