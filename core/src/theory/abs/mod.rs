pub mod builtin;
pub mod data;
pub mod def;
pub mod level;
pub mod meta;
pub mod normalize;
pub mod pretty;
pub mod subst;
pub mod unify;
