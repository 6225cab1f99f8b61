//! Price-time priority matching
//!
//! The crossing predicate and the matching walk. Every trade settles both
//! ledger legs before it touches book state.

pub mod crossing;
pub mod engine;

pub use crossing::crosses;
pub use engine::{MatchingEngine, TradeLog};
