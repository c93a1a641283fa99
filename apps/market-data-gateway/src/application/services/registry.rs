//! Connection Registry
//!
//! Live push connections, the symbols each one watches, and a bounded
//! outbox per connection. All state sits behind one `RwLock`; readers get
//! copies, never references into the maps.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::domain::market::{Quote, Symbol};
use crate::domain::subscription::{
    ConnectionId, SubscriptionBook, SubscriptionChanges, UnknownConnection,
};
use crate::infrastructure::metrics;

// =============================================================================
// Messages
// =============================================================================

/// Message pushed to a realtime client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Latest quotes for the client's symbols.
    Quotes {
        /// Quotes resolved this tick.
        data: Vec<Quote>,
    },
    /// The connection's current symbol set.
    Subscribed {
        /// Symbols, sorted.
        symbols: Vec<Symbol>,
    },
    /// Reply to a client ping.
    Pong,
    /// Malformed request or invalid symbol.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

// =============================================================================
// Errors and Outcomes
// =============================================================================

/// Registry operation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The connection is not registered.
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
}

impl From<UnknownConnection> for RegistryError {
    fn from(err: UnknownConnection) -> Self {
        Self::UnknownConnection(err.0)
    }
}

/// Result of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Payload queued.
    Delivered,
    /// Outbox full; payload discarded, connection kept.
    Dropped,
    /// Outbox closed or connection unknown; connection unregistered.
    Closed,
}

/// Copy of the registry taken once per fan-out tick.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// Each open connection with its symbol set.
    pub connections: Vec<(ConnectionId, BTreeSet<Symbol>)>,
    /// Union of all symbol sets.
    pub symbols: BTreeSet<Symbol>,
}

impl RegistrySnapshot {
    /// Whether nobody is watching anything.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.symbols.is_empty()
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Default)]
struct RegistryState {
    book: SubscriptionBook,
    outboxes: HashMap<ConnectionId, mpsc::Sender<ServerMessage>>,
}

/// Tracks live push connections and their outboxes.
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    outbox_capacity: usize,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ConnectionRegistry")
            .field("connections", &state.book.connection_count())
            .field("symbols", &state.book.symbol_count())
            .field("outbox_capacity", &self.outbox_capacity)
            .finish()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry whose outboxes hold `outbox_capacity`
    /// messages each.
    #[must_use]
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Open a connection with an empty symbol set.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.outbox_capacity);

        let (connections, symbols) = {
            let mut state = self.state.write();
            state.book.open(id);
            state.outboxes.insert(id, tx);
            (state.book.connection_count(), state.book.symbol_count())
        };
        metrics::set_registry_size(connections, symbols);
        tracing::debug!(connection = %id, connections, "Connection registered");

        (id, rx)
    }

    /// Close a connection and release its symbols. Returns `false` if it
    /// was not registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let (existed, changes, connections, symbols) = {
            let mut state = self.state.write();
            let existed = state.outboxes.remove(&id).is_some();
            let changes = state.book.close(id);
            (
                existed,
                changes,
                state.book.connection_count(),
                state.book.symbol_count(),
            )
        };

        if existed {
            metrics::set_registry_size(connections, symbols);
            tracing::debug!(
                connection = %id,
                connections,
                released = ?changes.deactivated,
                "Connection unregistered"
            );
        }
        existed
    }

    /// Union `symbols` into the connection's set.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] if `id` is not open.
    pub fn add_symbols(
        &self,
        id: ConnectionId,
        symbols: &[Symbol],
    ) -> Result<SubscriptionChanges, RegistryError> {
        self.mutate(id, |book| book.add(id, symbols))
    }

    /// Remove `symbols` from the connection's set.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] if `id` is not open.
    pub fn remove_symbols(
        &self,
        id: ConnectionId,
        symbols: &[Symbol],
    ) -> Result<SubscriptionChanges, RegistryError> {
        self.mutate(id, |book| book.remove(id, symbols))
    }

    fn mutate(
        &self,
        id: ConnectionId,
        op: impl FnOnce(&mut SubscriptionBook) -> Result<SubscriptionChanges, UnknownConnection>,
    ) -> Result<SubscriptionChanges, RegistryError> {
        let (changes, connections, symbols) = {
            let mut state = self.state.write();
            let changes = op(&mut state.book)?;
            (
                changes,
                state.book.connection_count(),
                state.book.symbol_count(),
            )
        };

        if !changes.is_empty() {
            metrics::set_registry_size(connections, symbols);
            tracing::debug!(
                connection = %id,
                activated = ?changes.activated,
                deactivated = ?changes.deactivated,
                "Watched symbols changed"
            );
        }
        Ok(changes)
    }

    /// The connection's symbols, sorted.
    #[must_use]
    pub fn symbols_of(&self, id: ConnectionId) -> Option<Vec<Symbol>> {
        self.state
            .read()
            .book
            .symbols_of(id)
            .map(|set| set.iter().cloned().collect())
    }

    /// Distinct symbols with at least one watcher.
    #[must_use]
    pub fn active_symbols(&self) -> BTreeSet<Symbol> {
        self.state.read().book.active_symbols()
    }

    /// Open connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.read().book.connection_count()
    }

    /// Copy of every connection's symbol set plus their union.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read();
        RegistrySnapshot {
            connections: state
                .book
                .iter()
                .map(|(id, symbols)| (*id, symbols.clone()))
                .collect(),
            symbols: state.book.active_symbols(),
        }
    }

    /// Queue `message` for `id` without waiting.
    ///
    /// A full outbox drops the message; a closed outbox (or unknown id)
    /// unregisters the connection.
    pub fn send(&self, id: ConnectionId, message: ServerMessage) -> SendOutcome {
        let sender = self.state.read().outboxes.get(&id).cloned();
        let Some(sender) = sender else {
            return SendOutcome::Closed;
        };

        match sender.try_send(message) {
            Ok(()) => SendOutcome::Delivered,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(connection = %id, "Outbox full, dropping payload");
                SendOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                self.unregister(id);
                SendOutcome::Closed
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
