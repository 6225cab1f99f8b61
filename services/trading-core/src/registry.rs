//! Order book registry
//!
//! Explicit owner of `symbol → (book, lock)`. Constructed once and passed
//! by reference; nothing in the crate reaches for process-wide globals.
//! Each book sits behind its own async mutex because settlement RPCs are
//! awaited while the lock is held; different symbols proceed in parallel.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use types::ids::Symbol;

use crate::book::{BookSnapshot, SymbolBook};

/// Registry of per-symbol books and their exclusive locks
#[derive(Debug, Default)]
pub struct OrderBookRegistry {
    books: DashMap<Symbol, Arc<Mutex<SymbolBook>>>,
}

impl OrderBookRegistry {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
        }
    }

    /// Get the book for a symbol, creating it on first use
    pub fn book(&self, symbol: &Symbol) -> Arc<Mutex<SymbolBook>> {
        self.books
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SymbolBook::new(symbol.clone()))))
            .clone()
    }

    /// Get the book for a symbol if it exists
    pub fn get(&self, symbol: &Symbol) -> Option<Arc<Mutex<SymbolBook>>> {
        self.books.get(symbol).map(|entry| entry.value().clone())
    }

    /// Symbols with an initialized book
    pub fn symbols(&self) -> Vec<Symbol> {
        self.books.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Consistent snapshot of one symbol's book
    pub async fn snapshot(&self, symbol: &Symbol, depth: usize) -> Option<BookSnapshot> {
        let book = self.get(symbol)?;
        let guard = book.lock().await;
        Some(guard.snapshot(depth))
    }
}
