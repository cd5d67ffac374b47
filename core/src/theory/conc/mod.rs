pub mod data;
pub mod elab;
pub mod instance;
pub mod load;
pub mod pattern;
pub mod resolve;
pub mod termination;
