//! Realtime Quote Channel
//!
//! One WebSocket per viewer. The socket task owns the read half and the
//! write half; everything the server pushes (tick quotes, acks, pongs,
//! errors) goes through the connection's registry outbox so ordering is
//! per-connection FIFO.

use std::collections::BTreeSet;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::{Deserialize, Serialize};

use crate::application::services::ServerMessage;
use crate::domain::market::{Symbol, normalize_symbol};
use crate::domain::subscription::ConnectionId;
use crate::infrastructure::http::AppState;

/// Most symbols one connection may watch.
pub const MAX_SYMBOLS_PER_CONNECTION: usize = 50;

/// Message sent by a realtime client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start watching symbols.
    Subscribe {
        /// Symbols to add.
        symbols: Vec<String>,
    },
    /// Stop watching symbols.
    Unsubscribe {
        /// Symbols to remove.
        symbols: Vec<String>,
    },
    /// Keepalive.
    Ping,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (id, mut outbox) = state.registry.register();
    let (mut sink, mut stream) = socket.split();

    tracing::info!(connection = %id, "Realtime client connected");

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            queued = outbox.recv() => {
                let Some(message) = queued else { break };
                if let Err(e) = send_json(&mut sink, &message).await {
                    tracing::debug!(connection = %id, error = %e, "Write failed, closing");
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_text(&state, id, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(connection = %id, error = %e, "Read failed, closing");
                    break;
                }
                // Binary and control frames are ignored; axum answers pings.
                Some(Ok(_)) => {}
            }
        }
    }

    state.registry.unregister(id);
    tracing::info!(connection = %id, "Realtime client disconnected");
}

async fn send_json(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    sink.send(Message::Text(json.into())).await
}

fn handle_text(state: &AppState, id: ConnectionId, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            reply_error(state, id, format!("malformed message: {e}"));
            return;
        }
    };

    match message {
        ClientMessage::Subscribe { symbols } => subscribe(state, id, &symbols),
        ClientMessage::Unsubscribe { symbols } => unsubscribe(state, id, &symbols),
        ClientMessage::Ping => {
            state.registry.send(id, ServerMessage::Pong);
        }
    }
}

fn subscribe(state: &AppState, id: ConnectionId, raw: &[String]) {
    let Some(symbols) = parse_symbols(state, id, raw) else {
        return;
    };

    let current: BTreeSet<Symbol> = state
        .registry
        .symbols_of(id)
        .unwrap_or_default()
        .into_iter()
        .collect();
    let added: Vec<Symbol> = symbols
        .into_iter()
        .filter(|s| !current.contains(s))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if current.len() + added.len() > MAX_SYMBOLS_PER_CONNECTION {
        reply_error(
            state,
            id,
            format!("at most {MAX_SYMBOLS_PER_CONNECTION} symbols per connection"),
        );
        return;
    }

    if state.registry.add_symbols(id, &added).is_err() {
        return;
    }
    acknowledge(state, id);

    if !added.is_empty() {
        push_snapshot(state, id, added);
    }
}

fn unsubscribe(state: &AppState, id: ConnectionId, raw: &[String]) {
    let Some(symbols) = parse_symbols(state, id, raw) else {
        return;
    };
    if state.registry.remove_symbols(id, &symbols).is_ok() {
        acknowledge(state, id);
    }
}

/// Normalize every symbol, or reply with one error naming the bad ones.
fn parse_symbols(state: &AppState, id: ConnectionId, raw: &[String]) -> Option<Vec<Symbol>> {
    let mut symbols = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();

    for symbol in raw {
        match normalize_symbol(symbol) {
            Ok(symbol) => symbols.push(symbol),
            Err(e) => rejected.push(e.to_string()),
        }
    }

    if !rejected.is_empty() {
        reply_error(state, id, format!("invalid symbols: {}", rejected.join("; ")));
        return None;
    }
    if symbols.is_empty() {
        reply_error(state, id, "no symbols given".to_string());
        return None;
    }
    Some(symbols)
}

fn acknowledge(state: &AppState, id: ConnectionId) {
    let symbols = state.registry.symbols_of(id).unwrap_or_default();
    state.registry.send(id, ServerMessage::Subscribed { symbols });
}

fn reply_error(state: &AppState, id: ConnectionId, message: String) {
    tracing::debug!(connection = %id, %message, "Rejected client message");
    state.registry.send(id, ServerMessage::Error { message });
}

/// Send current quotes for newly watched symbols without waiting for the
/// next tick.
fn push_snapshot(state: &AppState, id: ConnectionId, symbols: Vec<Symbol>) {
    let service = state.service.clone();
    let registry = state.registry.clone();

    tokio::spawn(async move {
        let quotes = service.get_quotes(&symbols).await;
        let watched: BTreeSet<Symbol> = registry
            .symbols_of(id)
            .unwrap_or_default()
            .into_iter()
            .collect();
        let data: Vec<_> = quotes
            .into_iter()
            .filter(|q| watched.contains(&q.symbol))
            .collect();
        if !data.is_empty() {
            registry.send(id, ServerMessage::Quotes { data });
        }
    });
}
