//! Bracket topology and advancement.
//!
//! [`builder`] turns an ordered field into a match graph with a complete
//! routing table; [`arena`] advances that graph as results come in. Both are
//! pure and never touch storage.

pub mod arena;
pub mod builder;
pub mod errors;

pub use arena::{BracketArena, Standing};
pub use builder::{BracketPlan, build_bracket, seed_order, seed_positions};
pub use errors::{BracketError, BracketResult};
