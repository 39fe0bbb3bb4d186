//! Ordering-token source.

use std::sync::atomic::{AtomicU64, Ordering};

use arbor_types::Zxid;

/// Issues strictly increasing transaction tokens.
pub trait TokenSource: Send + Sync {
    /// Consumes and returns the next token.
    fn next_zxid(&self) -> Zxid;

    /// Most recently issued token.
    fn current_zxid(&self) -> Zxid;
}

/// Token source backed by an atomic counter.
#[derive(Debug, Default)]
pub struct AtomicTokenSource {
    last: AtomicU64,
}

impl AtomicTokenSource {
    /// Creates a source whose first token is `last + 1`.
    pub fn new(last: Zxid) -> Self {
        Self { last: AtomicU64::new(last.value()) }
    }
}

impl TokenSource for AtomicTokenSource {
    fn next_zxid(&self) -> Zxid {
        Zxid::new(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn current_zxid(&self) -> Zxid {
        Zxid::new(self.last.load(Ordering::SeqCst))
    }
}
