//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, upstream status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (upstream credential accepted)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{ConnectionRegistry, MarketDataService};
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::provider::{UpstreamSnapshot, UpstreamState, UpstreamStatus};

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream provider status.
    pub upstream: UpstreamSnapshot,
    /// Realtime connection statistics.
    pub realtime: RealtimeStatus,
    /// Resident cache entries across all caches.
    pub cache_entries: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Upstream failing or rate limited; cached data still served.
    Degraded,
    /// Upstream credential rejected.
    Unhealthy,
}

impl From<UpstreamState> for HealthStatus {
    fn from(state: UpstreamState) -> Self {
        match state {
            UpstreamState::Ok => Self::Healthy,
            UpstreamState::Degraded => Self::Degraded,
            UpstreamState::Unauthorized => Self::Unhealthy,
        }
    }
}

/// Realtime connection statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeStatus {
    /// Open WebSocket connections.
    pub connections: usize,
    /// Distinct watched symbols.
    pub active_symbols: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    upstream: Arc<UpstreamStatus>,
    registry: Arc<ConnectionRegistry>,
    service: Arc<MarketDataService>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        upstream: Arc<UpstreamStatus>,
        registry: Arc<ConnectionRegistry>,
        service: Arc<MarketDataService>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            upstream,
            registry,
            service,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Routes served by the health server.
    pub fn router(state: Arc<HealthServerState>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Self::router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.upstream.state() == UpstreamState::Unauthorized {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let upstream = state.upstream.snapshot();
    let status = HealthStatus::from(upstream.state);

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        upstream,
        realtime: RealtimeStatus {
            connections: state.registry.connection_count(),
            active_symbols: state.registry.active_symbols().len(),
        },
        cache_entries: state.service.cache_entries(),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MarketDataError, MockMarketDataPort};
    use crate::application::services::CachePolicy;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> (Arc<HealthServerState>, Arc<UpstreamStatus>) {
        let upstream = Arc::new(UpstreamStatus::new());
        let service = Arc::new(MarketDataService::new(
            Arc::new(MockMarketDataPort::new()),
            CachePolicy::default(),
        ));
        let state = Arc::new(HealthServerState::new(
            "test".to_string(),
            Arc::clone(&upstream),
            Arc::new(ConnectionRegistry::new(4)),
            service,
        ));
        (state, upstream)
    }

    async fn get_status(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_upstream() {
        let (state, upstream) = state();
        assert_eq!(build_health_response(&state).status, HealthStatus::Healthy);

        upstream.record(Err(&MarketDataError::unavailable("503")));
        assert_eq!(build_health_response(&state).status, HealthStatus::Degraded);

        upstream.record(Err(&MarketDataError::Unauthorized));
        assert_eq!(build_health_response(&state).status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn readiness_fails_only_when_unauthorized() {
        let (state, upstream) = state();
        let router = HealthServer::router(state);

        upstream.record(Err(&MarketDataError::RateLimited {
            retry_after_secs: 1,
        }));
        assert_eq!(get_status(router.clone(), "/readyz").await, StatusCode::OK);

        upstream.record(Err(&MarketDataError::Unauthorized));
        assert_eq!(
            get_status(router.clone(), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(router, "/health").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        let (state, _) = state();
        assert_eq!(
            get_status(HealthServer::router(state), "/healthz").await,
            StatusCode::OK
        );
    }
}
