//! HTTP client for the market data provider with retry logic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use super::backoff::{RetryConfig, RetryPolicy};
use super::status::UpstreamStatus;
use super::types::{
    CandleResponse, ErrorResponse, MetricResponse, ProfileResponse, QuoteResponse, SearchResponse,
};
use crate::application::ports::{MarketDataError, MarketDataPort};
use crate::domain::market::{
    CandleSeries, CompanyMetrics, CompanyProfile, Quote, Resolution, SymbolMatch,
};
use crate::infrastructure::config::Credentials;
use crate::infrastructure::metrics::{self, Endpoint};

/// Retry-After used when a 429 carries none.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Provider connection settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL, e.g. `https://finnhub.io/api/v1`.
    pub base_url: String,
    /// API token.
    pub credentials: Credentials,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retry behavior for transient failures.
    pub retry: RetryConfig,
}

/// Market data provider adapter.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    retry: RetryConfig,
    status: Arc<UpstreamStatus>,
}

impl ProviderClient {
    /// Create a new client from config.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for an empty token; `UpstreamUnavailable` if the HTTP
    /// client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, MarketDataError> {
        if config.credentials.api_key().is_empty() {
            return Err(MarketDataError::Unauthorized);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MarketDataError::unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: config.credentials.clone(),
            retry: config.retry.clone(),
            status: Arc::new(UpstreamStatus::new()),
        })
    }

    /// Shared outcome tracker for health reporting.
    #[must_use]
    pub fn status(&self) -> Arc<UpstreamStatus> {
        Arc::clone(&self.status)
    }

    /// GET `path` and decode the JSON body, recording metrics and status.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketDataError> {
        let started = Instant::now();
        let result = self.request(path, query).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_upstream_request(endpoint, outcome, started.elapsed());
        self.status.record(result.as_ref().map(|_| ()));

        result
    }

    async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketDataError> {
        let url = format!("{}{path}", self.base_url);
        let mut policy = RetryPolicy::new(self.retry.clone());

        loop {
            let sent = self
                .client
                .get(&url)
                .query(query)
                .query(&[("token", self.credentials.api_key())])
                .send()
                .await;

            let response = match sent {
                Ok(resp) => resp,
                Err(e) => {
                    // Strip the URL: it carries the token.
                    let e = e.without_url();
                    if let Some(delay) = policy.next_delay() {
                        tracing::warn!(
                            path,
                            error = %e,
                            delay_ms = delay.as_millis(),
                            attempt = policy.attempts(),
                            "Provider request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(MarketDataError::unavailable(format!(
                        "request failed after {} attempts: {e}",
                        policy.attempts()
                    )));
                }
            };

            let status = response.status();

            if status.is_success() {
                let body = match response.bytes().await {
                    Ok(body) => body,
                    Err(e) => {
                        let e = e.without_url();
                        if let Some(delay) = policy.next_delay() {
                            tracing::warn!(
                                path,
                                error = %e,
                                delay_ms = delay.as_millis(),
                                attempt = policy.attempts(),
                                "Provider response body failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(MarketDataError::unavailable(format!(
                            "response body failed after {} attempts: {e}",
                            policy.attempts()
                        )));
                    }
                };
                return serde_json::from_slice(&body).map_err(|e| {
                    tracing::warn!(path, error = %e, "Undecodable provider response");
                    MarketDataError::unavailable(format!("undecodable response: {e}"))
                });
            }

            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());

            match categorize_status(status) {
                ErrorCategory::RateLimited => {
                    let retry_after_secs = retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                    tracing::warn!(path, retry_after_secs, "Provider rate limit hit");
                    return Err(MarketDataError::RateLimited { retry_after_secs });
                }
                ErrorCategory::Retryable => {
                    if let Some(delay) = policy.next_delay() {
                        tracing::warn!(
                            path,
                            status = status.as_u16(),
                            delay_ms = delay.as_millis(),
                            attempt = policy.attempts(),
                            "Retryable provider error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(MarketDataError::unavailable(format!(
                        "provider returned {status} after {} attempts",
                        policy.attempts()
                    )));
                }
                ErrorCategory::NonRetryable => {
                    return match status {
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            tracing::error!(path, status = status.as_u16(), "Provider rejected API key");
                            Err(MarketDataError::Unauthorized)
                        }
                        StatusCode::NOT_FOUND => Err(MarketDataError::NotFound),
                        _ => {
                            let body = response.text().await.unwrap_or_default();
                            let message = serde_json::from_str::<ErrorResponse>(&body)
                                .map(|e| e.error)
                                .unwrap_or_else(|_| format!("provider returned {status}"));
                            Err(MarketDataError::InvalidInput { message })
                        }
                    };
                }
            }
        }
    }
}

#[async_trait]
impl MarketDataPort for ProviderClient {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let response: QuoteResponse = self
            .get_json(Endpoint::Quote, "/quote", &[("symbol", symbol.to_string())])
            .await?;
        response.into_quote(symbol)
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        resolution: Resolution,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CandleSeries, MarketDataError> {
        let response: CandleResponse = self
            .get_json(
                Endpoint::Candles,
                "/stock/candle",
                &[
                    ("symbol", symbol.to_string()),
                    ("resolution", resolution.as_str().to_string()),
                    ("from", from.timestamp().to_string()),
                    ("to", to.timestamp().to_string()),
                ],
            )
            .await?;
        response.into_series(symbol, resolution)
    }

    async fn fetch_profile(&self, symbol: &str) -> Result<CompanyProfile, MarketDataError> {
        let response: ProfileResponse = self
            .get_json(
                Endpoint::Profile,
                "/stock/profile2",
                &[("symbol", symbol.to_string())],
            )
            .await?;
        response.into_profile(symbol)
    }

    async fn fetch_metrics(&self, symbol: &str) -> Result<CompanyMetrics, MarketDataError> {
        let response: MetricResponse = self
            .get_json(
                Endpoint::Metrics,
                "/stock/metric",
                &[("symbol", symbol.to_string()), ("metric", "all".to_string())],
            )
            .await?;
        response.into_metrics(symbol)
    }

    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>, MarketDataError> {
        let response: SearchResponse = self
            .get_json(Endpoint::Search, "/search", &[("q", query.to_string())])
            .await?;
        Ok(response.result.into_iter().map(SymbolMatch::from).collect())
    }
}

/// Error category for determining retry behavior.
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500..=599 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}
