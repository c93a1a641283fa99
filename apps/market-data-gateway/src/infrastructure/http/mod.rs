//! HTTP API (Driver Adapter)
//!
//! Axum-based REST API and WebSocket endpoint delegating to the market
//! data service and connection registry.
//!
//! # Endpoints
//!
//! - `GET  /api/quote/{symbol}` - Latest quote
//! - `POST /api/quotes` - Batch quotes, failures omitted
//! - `GET  /api/historical/{symbol}?period=1M` - Candles plus indicators
//! - `GET  /api/search?q=` - Symbol search
//! - `GET  /api/profile/{symbol}` - Company profile
//! - `GET  /api/metrics/{symbol}` - Company fundamentals
//! - `POST /api/compare` - Period performance for several symbols
//! - `GET  /ws` - Realtime quote channel

mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::{ApiError, ErrorBody, ErrorCode, ErrorDetail};

use crate::application::services::{ConnectionRegistry, HistoricalData, MarketDataService};
use crate::domain::market::{
    CompanyMetrics, CompanyProfile, Comparison, HistoryPeriod, Quote, SymbolMatch,
};
use crate::infrastructure::websocket;

/// Most symbols accepted by one batch or compare request.
pub const MAX_BATCH_SYMBOLS: usize = 50;

// =============================================================================
// State
// =============================================================================

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Cached market data use cases.
    pub service: Arc<MarketDataService>,
    /// Realtime connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Fires on shutdown; closes realtime sockets.
    pub shutdown: CancellationToken,
}

// =============================================================================
// Request Types
// =============================================================================

/// `POST /api/quotes` body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SymbolsRequest {
    /// Symbols to resolve.
    pub symbols: Vec<String>,
}

/// `POST /api/compare` body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompareRequest {
    /// Symbols to compare.
    pub symbols: Vec<String>,
    /// Period label; defaults to `1M`.
    #[serde(default)]
    pub period: Option<String>,
}

/// `?period=` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodQuery {
    /// Period label.
    pub period: Option<String>,
}

/// `?q=` query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    /// Free-text query.
    pub q: Option<String>,
}

// =============================================================================
// Router
// =============================================================================

/// Create the HTTP router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/quote/{symbol}", get(get_quote))
        .route("/api/quotes", post(get_quotes))
        .route("/api/historical/{symbol}", get(get_historical))
        .route("/api/search", get(search))
        .route("/api/profile/{symbol}", get(get_profile))
        .route("/api/metrics/{symbol}", get(get_metrics))
        .route("/api/compare", post(compare))
        .route("/ws", get(websocket::ws_handler))
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

async fn get_quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<Quote>, ApiError> {
    Ok(Json(state.service.get_quote(&symbol).await?))
}

async fn get_quotes(
    State(state): State<AppState>,
    body: Result<Json<SymbolsRequest>, JsonRejection>,
) -> Result<Json<Vec<Quote>>, ApiError> {
    let Json(request) = body?;
    check_batch(&request.symbols)?;
    Ok(Json(state.service.get_quotes(&request.symbols).await))
}

async fn get_historical(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> Result<Json<HistoricalData>, ApiError> {
    let Query(query) = query?;
    let period = parse_period(query.period.as_deref())?;
    Ok(Json(state.service.get_history(&symbol, period).await?))
}

async fn search(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<SymbolMatch>>, ApiError> {
    let Query(query) = query?;
    let q = query.q.unwrap_or_default();
    Ok(Json(state.service.search(&q).await?))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<CompanyProfile>, ApiError> {
    Ok(Json(state.service.profile(&symbol).await?))
}

async fn get_metrics(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<CompanyMetrics>, ApiError> {
    Ok(Json(state.service.metrics(&symbol).await?))
}

async fn compare(
    State(state): State<AppState>,
    body: Result<Json<CompareRequest>, JsonRejection>,
) -> Result<Json<Vec<Comparison>>, ApiError> {
    let Json(request) = body?;
    check_batch(&request.symbols)?;
    let period = parse_period(request.period.as_deref())?;
    Ok(Json(state.service.compare(&request.symbols, period).await?))
}

fn parse_period(raw: Option<&str>) -> Result<HistoryPeriod, ApiError> {
    raw.map_or(Ok(HistoryPeriod::default()), |p| {
        p.parse::<HistoryPeriod>()
            .map_err(|e| ApiError::invalid(e.to_string()))
    })
}

fn check_batch(symbols: &[String]) -> Result<(), ApiError> {
    if symbols.len() > MAX_BATCH_SYMBOLS {
        return Err(ApiError::invalid(format!(
            "at most {MAX_BATCH_SYMBOLS} symbols per request"
        )));
    }
    Ok(())
}

// =============================================================================
// Server
// =============================================================================

/// Public API server.
pub struct ApiServer {
    port: u16,
    state: AppState,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a new API server.
    #[must_use]
    pub const fn new(port: u16, state: AppState, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the API server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the HTTP server encounters
    /// a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let app = create_router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

/// API server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
