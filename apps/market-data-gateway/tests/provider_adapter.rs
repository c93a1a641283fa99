//! Provider Adapter Integration Tests
//!
//! Runs `ProviderClient` against a mock Finnhub-compatible server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use test_case::test_case;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use market_data_gateway::domain::market::SeriesStatus;
use market_data_gateway::infrastructure::provider::UpstreamState;
use market_data_gateway::{
    Credentials, MarketDataError, MarketDataPort, ProviderClient, ProviderConfig, Resolution,
    RetryConfig,
};

const TOKEN: &str = "test-token";

fn client(server: &MockServer, retry: RetryConfig) -> ProviderClient {
    ProviderClient::new(&ProviderConfig {
        base_url: server.uri(),
        credentials: Credentials::new(TOKEN.to_string()),
        timeout: Duration::from_secs(2),
        retry,
    })
    .unwrap()
}

fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        ..RetryConfig::default()
    }
}

#[tokio::test]
async fn quote_is_decoded_and_token_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .and(query_param("symbol", "AAPL"))
        .and(query_param("token", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "c": 189.5, "d": 1.5, "dp": 0.7979, "h": 190.0, "l": 187.25,
            "o": 188.0, "pc": 188.0, "t": 1_700_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let quote = client(&server, RetryConfig::disabled())
        .fetch_quote("AAPL")
        .await
        .unwrap();

    assert_eq!(quote.symbol, "AAPL");
    assert_eq!(quote.current, Decimal::new(1895, 1));
    assert_eq!(quote.change, Decimal::new(15, 1));
    assert_eq!(quote.previous_close, Decimal::from(188));
    assert_eq!(
        quote.timestamp,
        Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    );
}

#[tokio::test]
async fn zero_quote_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "c": 0, "d": null, "dp": null, "h": 0, "l": 0, "o": 0, "pc": 0, "t": 0
        })))
        .mount(&server)
        .await;

    let client = client(&server, RetryConfig::disabled());
    assert_eq!(
        client.fetch_quote("ZZZZINVALID").await,
        Err(MarketDataError::NotFound)
    );
    assert_eq!(client.status().state(), UpstreamState::Ok);
}

#[tokio::test]
async fn rate_limit_carries_retry_after_and_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/quote"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "17"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, fast_retry(3));
    assert_eq!(
        client.fetch_quote("AAPL").await,
        Err(MarketDataError::RateLimited {
            retry_after_secs: 17
        })
    );
    assert_eq!(client.status().state(), UpstreamState::Degraded);
}

#[test_case(401 ; "unauthorized")]
#[test_case(403 ; "forbidden")]
#[tokio::test]
async fn rejected_key_marks_upstream_unhealthy(status: u16) {
    let server = MockServer::start().await;
    Mock::given(path("/quote"))
        .respond_with(
            ResponseTemplate::new(status).set_body_json(json!({"error": "Invalid API key"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, fast_retry(3));
    assert_eq!(
        client.fetch_quote("AAPL").await,
        Err(MarketDataError::Unauthorized)
    );
    assert_eq!(client.status().state(), UpstreamState::Unauthorized);
}

#[tokio::test]
async fn timeout_before_headers_is_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/quote"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"c": 1.0}))
                .set_delay(Duration::from_secs(2)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let client = ProviderClient::new(&ProviderConfig {
        base_url: server.uri(),
        credentials: Credentials::new(TOKEN.to_string()),
        timeout: Duration::from_millis(200),
        retry: fast_retry(2),
    })
    .unwrap();

    let err = client.fetch_quote("AAPL").await.unwrap_err();
    assert!(matches!(err, MarketDataError::UpstreamUnavailable { .. }));
}

#[tokio::test]
async fn timeout_while_reading_body_is_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));

    let accepted = Arc::clone(&attempts);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0_u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"c\":",
                    )
                    .await;
                // Hold the connection open without finishing the body.
                tokio::time::sleep(Duration::from_secs(5)).await;
            });
        }
    });

    let client = ProviderClient::new(&ProviderConfig {
        base_url: format!("http://{addr}"),
        credentials: Credentials::new(TOKEN.to_string()),
        timeout: Duration::from_millis(300),
        retry: fast_retry(2),
    })
    .unwrap();

    let err = client.fetch_quote("AAPL").await.unwrap_err();
    assert!(matches!(err, MarketDataError::UpstreamUnavailable { .. }));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(client.status().snapshot().failures, 1);
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(path("/quote"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "c": 10.0, "d": 0.0, "dp": 0.0, "h": 10.0, "l": 10.0, "o": 10.0, "pc": 10.0,
            "t": 1_700_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, fast_retry(2));
    let quote = client.fetch_quote("MSFT").await.unwrap();
    assert_eq!(quote.current, Decimal::from(10));

    // One logical request despite three attempts.
    let snapshot = client.status().snapshot();
    assert_eq!(snapshot.requests, 1);
    assert_eq!(snapshot.failures, 0);
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(path("/quote"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let result = client(&server, fast_retry(1)).fetch_quote("MSFT").await;
    assert!(matches!(
        result,
        Err(MarketDataError::UpstreamUnavailable { .. })
    ));
}

#[tokio::test]
async fn not_found_status_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(path("/stock/profile2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert_eq!(
        client(&server, RetryConfig::disabled())
            .fetch_profile("NOPE")
            .await,
        Err(MarketDataError::NotFound)
    );
}

#[tokio::test]
async fn bad_request_surfaces_provider_message() {
    let server = MockServer::start().await;
    Mock::given(path("/search"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "query too short"})),
        )
        .mount(&server)
        .await;

    assert_eq!(
        client(&server, RetryConfig::disabled())
            .search_symbols("a")
            .await,
        Err(MarketDataError::InvalidInput {
            message: "query too short".to_string()
        })
    );
}

#[tokio::test]
async fn candles_ok_and_no_data() {
    let server = MockServer::start().await;
    Mock::given(path("/stock/candle"))
        .and(query_param("symbol", "AAPL"))
        .and(query_param("resolution", "D"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "s": "ok",
            "t": [1_700_000_000, 1_700_086_400, 1_700_172_800],
            "o": [1.0, 2.0, 3.0],
            "h": [1.5, 2.5, 3.5],
            "l": [0.5, 1.5, 2.5],
            "c": [1.2, 2.2, 3.2],
            "v": [100.0, 200.0, 300.0]
        })))
        .mount(&server)
        .await;
    Mock::given(path("/stock/candle"))
        .and(query_param("symbol", "HALT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"s": "no_data"})))
        .mount(&server)
        .await;

    let client = client(&server, RetryConfig::disabled());
    let to = Utc::now();
    let from = to - chrono::Duration::days(30);

    let series = client
        .fetch_candles("AAPL", Resolution::Day, from, to)
        .await
        .unwrap();
    assert_eq!(series.status, SeriesStatus::Ok);
    assert_eq!(series.len(), 3);
    assert_eq!(series.close, vec![1.2, 2.2, 3.2]);

    let empty = client
        .fetch_candles("HALT", Resolution::Day, from, to)
        .await
        .unwrap();
    assert_eq!(empty.status, SeriesStatus::NoData);
    assert!(empty.is_empty());
}

#[tokio::test]
async fn mismatched_candle_columns_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(path("/stock/candle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "s": "ok", "t": [1, 2], "o": [1.0], "h": [1.0], "l": [1.0], "c": [1.0], "v": [1.0]
        })))
        .mount(&server)
        .await;

    let to = Utc::now();
    let result = client(&server, RetryConfig::disabled())
        .fetch_candles("AAPL", Resolution::Day, to - chrono::Duration::days(7), to)
        .await;
    assert!(matches!(
        result,
        Err(MarketDataError::UpstreamUnavailable { .. })
    ));
}

#[tokio::test]
async fn metrics_keep_numeric_values_only() {
    let server = MockServer::start().await;
    Mock::given(path("/stock/metric"))
        .and(query_param("metric", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metric": {"peTTM": 29.1, "52WeekHigh": 199.62, "note": "n/a"}
        })))
        .mount(&server)
        .await;

    let metrics = client(&server, RetryConfig::disabled())
        .fetch_metrics("AAPL")
        .await
        .unwrap();
    assert_eq!(metrics.metrics.len(), 2);
    assert_eq!(metrics.metrics["peTTM"], 29.1);
}

#[tokio::test]
async fn undecodable_body_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = client(&server, RetryConfig::disabled())
        .fetch_quote("AAPL")
        .await;
    assert!(matches!(
        result,
        Err(MarketDataError::UpstreamUnavailable { .. })
    ));
}
