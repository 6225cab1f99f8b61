//! Order book infrastructure
//!
//! Price levels, bid and ask sides, and the per-symbol book that owns the
//! resting-order table.

pub mod ask_book;
pub mod bid_book;
pub mod price_level;
pub mod symbol_book;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use price_level::PriceLevel;
pub use symbol_book::{BookSnapshot, DepthLevel, SymbolBook};
