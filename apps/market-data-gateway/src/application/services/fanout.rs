//! Fan-out Scheduler
//!
//! Periodically resolves every watched symbol through the quote cache and
//! pushes each connection the quotes for its own symbols. Best effort:
//! failed symbols are skipped until the next tick and slow consumers lose
//! payloads rather than stalling the tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::services::{
    ConnectionRegistry, MarketDataService, SendOutcome, ServerMessage,
};
use crate::domain::market::{Quote, Symbol};
use crate::infrastructure::metrics;

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Maximum quote lookups in flight during a tick.
    pub concurrency: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            concurrency: 8,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Distinct symbols looked up.
    pub requested: usize,
    /// Symbols that resolved to a quote.
    pub resolved: usize,
    /// Symbols that failed.
    pub failed: usize,
    /// Payloads queued to connections.
    pub deliveries: usize,
    /// Quotes contained in those payloads.
    pub quotes_delivered: usize,
    /// Payloads discarded on full outboxes.
    pub dropped: usize,
    /// Connections found closed and unregistered.
    pub closed: usize,
}

/// Periodic quote push.
#[derive(Debug)]
pub struct FanoutScheduler {
    service: Arc<MarketDataService>,
    registry: Arc<ConnectionRegistry>,
    config: FanoutConfig,
}

impl FanoutScheduler {
    /// Create a scheduler.
    #[must_use]
    pub const fn new(
        service: Arc<MarketDataService>,
        registry: Arc<ConnectionRegistry>,
        config: FanoutConfig,
    ) -> Self {
        Self {
            service,
            registry,
            config,
        }
    }

    /// Tick every `interval` until `cancel` fires. Ticks never overlap;
    /// a tick that overruns the interval causes the missed ticks to be
    /// skipped.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_ms = self.config.interval.as_millis(),
            concurrency = self.config.concurrency,
            "Fan-out scheduler started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if report.requested > 0 {
                        tracing::debug!(
                            requested = report.requested,
                            resolved = report.resolved,
                            failed = report.failed,
                            deliveries = report.deliveries,
                            dropped = report.dropped,
                            closed = report.closed,
                            "Fan-out tick complete"
                        );
                    }
                }
            }
        }

        tracing::info!("Fan-out scheduler stopped");
    }

    /// Run a single tick.
    pub async fn tick(&self) -> TickReport {
        let snapshot = self.registry.snapshot();
        if snapshot.is_idle() {
            return TickReport::default();
        }

        let started = Instant::now();
        let mut report = TickReport {
            requested: snapshot.symbols.len(),
            ..TickReport::default()
        };

        let service = &self.service;
        let lookups: Vec<(Symbol, _)> = stream::iter(snapshot.symbols.iter().cloned())
            .map(|symbol| async move {
                let result = service.get_quote(&symbol).await;
                (symbol, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut quotes: HashMap<Symbol, Quote> = HashMap::with_capacity(lookups.len());
        for (symbol, result) in lookups {
            match result {
                Ok(quote) => {
                    quotes.insert(symbol, quote);
                }
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(symbol = %symbol, error = %error, "Fan-out quote lookup failed");
                }
            }
        }
        report.resolved = quotes.len();

        for (id, symbols) in snapshot.connections {
            let data: Vec<Quote> = symbols
                .iter()
                .filter_map(|symbol| quotes.get(symbol).cloned())
                .collect();
            if data.is_empty() {
                continue;
            }

            let count = data.len();
            match self.registry.send(id, ServerMessage::Quotes { data }) {
                SendOutcome::Delivered => {
                    report.deliveries += 1;
                    report.quotes_delivered += count;
                }
                SendOutcome::Dropped => report.dropped += 1,
                SendOutcome::Closed => report.closed += 1,
            }
        }

        metrics::record_quotes_delivered(report.quotes_delivered as u64);
        metrics::record_payloads_dropped(report.dropped as u64);
        metrics::record_symbol_failures(report.failed as u64);
        metrics::record_tick_duration(started.elapsed());

        report
    }
}

// =============================================================================
// Tests
// =============================================================================
