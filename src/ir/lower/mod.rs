//! Lowering passes, each a pattern set applied through the rewrite engine.

pub mod select;
pub mod standard;

pub use select::lower_select;
pub use standard::lower_to_standard;
