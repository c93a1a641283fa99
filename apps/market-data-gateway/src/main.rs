//! Market Data Gateway Binary
//!
//! Starts the REST API, the realtime channel, the fan-out scheduler and the
//! health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-data-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_DATA_API_KEY`: Provider API token
//!
//! ## Optional
//! - `MARKET_DATA_BASE_URL`: Provider base URL (default: <https://finnhub.io/api/v1>)
//! - `GATEWAY_HTTP_PORT`: REST and WebSocket port (default: 8080)
//! - `GATEWAY_HEALTH_PORT`: Health check and metrics port (default: 8082)
//! - `GATEWAY_FANOUT_INTERVAL_SECS`: Realtime push interval (default: 5)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: `market_data_gateway=info`)
//!
//! Cache TTLs and retry tuning are listed in `GatewayConfig::from_lookup`.

use std::sync::Arc;
use std::time::Duration;

use market_data_gateway::application::ports::MarketDataPort;
use market_data_gateway::infrastructure::telemetry;
use market_data_gateway::{
    ApiServer, AppState, ConnectionRegistry, FanoutScheduler, GatewayConfig, HealthServer,
    HealthServerState, MarketDataService, ProviderClient, init_metrics,
};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting market data gateway");

    let _metrics_handle = init_metrics()?;

    let config = GatewayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let provider = ProviderClient::new(&config.provider)?;
    let upstream_status = provider.status();
    let port: Arc<dyn MarketDataPort> = Arc::new(provider);

    let service = Arc::new(MarketDataService::new(port, config.cache.policy));
    let registry = Arc::new(ConnectionRegistry::new(config.realtime.outbox_capacity));

    let mut tasks = JoinSet::new();

    for sweeper in service.spawn_sweepers(config.cache.sweep_interval, &shutdown_token) {
        tasks.spawn(async move {
            let _ = sweeper.await;
        });
    }

    let scheduler = FanoutScheduler::new(
        Arc::clone(&service),
        Arc::clone(&registry),
        config.realtime.fanout,
    );
    tasks.spawn(scheduler.run(shutdown_token.clone()));

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        upstream_status,
        Arc::clone(&registry),
        Arc::clone(&service),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tasks.spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let api_server = ApiServer::new(
        config.server.http_port,
        AppState {
            service,
            registry,
            shutdown: shutdown_token.clone(),
        },
        shutdown_token.clone(),
    );
    let api_shutdown = shutdown_token.clone();
    tasks.spawn(async move {
        if let Err(e) = api_server.run().await {
            tracing::error!(error = %e, "API server error");
            api_shutdown.cancel();
        }
    });

    tracing::info!("Market data gateway ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, aborting remaining tasks"
        );
        tasks.abort_all();
    }

    tracing::info!("Market data gateway stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        health_port = config.server.health_port,
        fanout_interval_secs = config.realtime.fanout.interval.as_secs(),
        fanout_concurrency = config.realtime.fanout.concurrency,
        outbox_capacity = config.realtime.outbox_capacity,
        "Configuration loaded"
    );
    tracing::debug!(
        base_url = %config.provider.base_url,
        timeout_secs = config.provider.timeout.as_secs(),
        max_retries = config.provider.retry.max_retries,
        cache = ?config.cache.policy,
        "Provider and cache settings"
    );
}

/// Load .env from the current directory or the nearest ancestor that has one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT) or an internal cancel.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Internal failure, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
