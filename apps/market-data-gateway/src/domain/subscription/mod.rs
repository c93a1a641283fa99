//! Subscription Book
//!
//! Tracks which symbols each live connection watches, with a per-symbol
//! reference count so the set of symbols that have at least one watcher is
//! available without scanning every connection.
//!
//! # Design
//!
//! The book is plain owned state with no locking; the connection registry
//! wraps it behind a single lock. Every mutation reports which symbols
//! became active (refcount 0→1) or inactive (refcount 1→0), so callers can
//! log and gauge the watched universe.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::market::Symbol;

// =============================================================================
// Types
// =============================================================================

/// Opaque handle for one live push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The connection is not (or no longer) in the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown connection {0}")]
pub struct UnknownConnection(pub ConnectionId);

// =============================================================================
// Subscription Changes
// =============================================================================

/// Effect of a mutation on the watched universe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols whose first watcher just arrived.
    pub activated: BTreeSet<Symbol>,
    /// Symbols whose last watcher just left.
    pub deactivated: BTreeSet<Symbol>,
}

impl SubscriptionChanges {
    /// Check if the watched universe changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.deactivated.is_empty()
    }
}

// =============================================================================
// Subscription Book
// =============================================================================

/// Per-connection symbol sets plus per-symbol reference counts.
///
/// # Example
///
/// ```rust
/// use market_data_gateway::domain::subscription::{ConnectionId, SubscriptionBook};
///
/// let mut book = SubscriptionBook::default();
/// let (a, b) = (ConnectionId::new(), ConnectionId::new());
/// book.open(a);
/// book.open(b);
///
/// let changes = book.add(a, &["AAPL".to_string()]).unwrap();
/// assert!(changes.activated.contains("AAPL"));
///
/// // Second watcher: universe unchanged
/// assert!(book.add(b, &["AAPL".to_string()]).unwrap().is_empty());
///
/// // Last watcher leaves
/// book.close(a);
/// let changes = book.close(b);
/// assert!(changes.deactivated.contains("AAPL"));
/// ```
#[derive(Debug, Default, Clone)]
pub struct SubscriptionBook {
    connections: HashMap<ConnectionId, BTreeSet<Symbol>>,
    refcount: HashMap<Symbol, usize>,
}

impl SubscriptionBook {
    /// Track a new connection with an empty symbol set. Re-opening an
    /// existing connection leaves its set untouched.
    pub fn open(&mut self, id: ConnectionId) {
        self.connections.entry(id).or_default();
    }

    /// Union `symbols` into the connection's set.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownConnection`] if the connection was never opened or
    /// has been closed.
    pub fn add(
        &mut self,
        id: ConnectionId,
        symbols: &[Symbol],
    ) -> Result<SubscriptionChanges, UnknownConnection> {
        let set = self.connections.get_mut(&id).ok_or(UnknownConnection(id))?;
        let mut changes = SubscriptionChanges::default();

        for symbol in symbols {
            if !set.insert(symbol.clone()) {
                continue;
            }
            let count = self.refcount.entry(symbol.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                changes.activated.insert(symbol.clone());
            }
        }

        Ok(changes)
    }

    /// Remove `symbols` from the connection's set.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownConnection`] if the connection is not tracked.
    pub fn remove(
        &mut self,
        id: ConnectionId,
        symbols: &[Symbol],
    ) -> Result<SubscriptionChanges, UnknownConnection> {
        let set = self.connections.get_mut(&id).ok_or(UnknownConnection(id))?;
        let mut changes = SubscriptionChanges::default();

        for symbol in symbols {
            if set.remove(symbol) && release(&mut self.refcount, symbol) {
                changes.deactivated.insert(symbol.clone());
            }
        }

        Ok(changes)
    }

    /// Forget a connection and release all of its symbols.
    pub fn close(&mut self, id: ConnectionId) -> SubscriptionChanges {
        let mut changes = SubscriptionChanges::default();
        let Some(set) = self.connections.remove(&id) else {
            return changes;
        };

        for symbol in set {
            if release(&mut self.refcount, &symbol) {
                changes.deactivated.insert(symbol);
            }
        }

        changes
    }

    /// Whether the connection is tracked.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// The connection's current symbol set.
    #[must_use]
    pub fn symbols_of(&self, id: ConnectionId) -> Option<&BTreeSet<Symbol>> {
        self.connections.get(&id)
    }

    /// Distinct symbols with at least one watcher.
    #[must_use]
    pub fn active_symbols(&self) -> BTreeSet<Symbol> {
        self.refcount.keys().cloned().collect()
    }

    /// Iterate `(connection, symbols)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&ConnectionId, &BTreeSet<Symbol>)> {
        self.connections.iter()
    }

    /// Number of tracked connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of distinct watched symbols.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.refcount.len()
    }
}

/// Decrement a refcount; true when it reached zero and was dropped.
fn release(refcount: &mut HashMap<Symbol, usize>, symbol: &Symbol) -> bool {
    let Some(count) = refcount.get_mut(symbol) else {
        return false;
    };
    *count = count.saturating_sub(1);
    if *count == 0 {
        refcount.remove(symbol);
        return true;
    }
    false
}

// =============================================================================
// Tests
// =============================================================================
