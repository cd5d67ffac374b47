use crate::theory::abs::builtin::PRELUDE;
use crate::theory::conc::load::Source;

/// Derived prelude definitions, checked right after the primitives.
pub const TEXT: &str = include_str!("Prelude.vc");

pub fn source() -> Source {
    Source::new(PRELUDE, TEXT)
}
