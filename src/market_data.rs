//! Candle fetching from the exchange REST API.
//!
//! Any failure (transport, status, payload) is logged and collapsed into an
//! empty window so the caller just moves on to the next symbol.

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::FetchError;
use crate::types::{Candle, CandleWindow};

pub const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";

/// Source of candle windows for the scan loop.
pub trait CandleSource: Send + Sync {
    /// Candles covering `granularity_secs * lookback` seconds up to now,
    /// ascending by timestamp. Empty when nothing usable came back.
    fn fetch(
        &self,
        symbol: &str,
        granularity_secs: u64,
        lookback: usize,
    ) -> impl Future<Output = CandleWindow> + Send;
}

/// Wire row: `[time, low, high, open, close, volume]`.
type CandleRow = (i64, f64, f64, f64, f64, f64);

pub struct MarketDataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MarketDataClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("breakout-scanner/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    /// Fetch the window ending at `end`, surfacing the failure reason.
    pub async fn try_fetch(
        &self,
        symbol: &str,
        granularity_secs: u64,
        lookback: usize,
        end: DateTime<Utc>,
    ) -> Result<CandleWindow, FetchError> {
        let span = ChronoDuration::seconds((granularity_secs as i64).saturating_mul(lookback as i64));
        let start = end - span;

        let url = format!("{}/products/{}/candles", self.base_url, symbol);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("granularity", granularity_secs.to_string()),
                ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.bytes().await?;
        let rows: Vec<CandleRow> = serde_json::from_slice(&body)?;
        if rows.is_empty() {
            return Err(FetchError::Empty);
        }

        let mut candles: CandleWindow = rows
            .into_iter()
            .map(|(ts, low, high, open, close, volume)| Candle::new(ts, low, high, open, close, volume))
            .collect();
        // The exchange returns newest first; never rely on it.
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

impl CandleSource for MarketDataClient {
    async fn fetch(&self, symbol: &str, granularity_secs: u64, lookback: usize) -> CandleWindow {
        match self.try_fetch(symbol, granularity_secs, lookback, Utc::now()).await {
            Ok(candles) => candles,
            Err(e) => {
                warn!(symbol, error = %e, "Candle fetch failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str) -> MarketDataClient {
        MarketDataClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_sorts_ascending_and_sends_range() {
        let seen: Arc<Mutex<Vec<(String, HashMap<String, String>)>>> = Arc::default();
        let recorder = Arc::clone(&seen);
        let router = Router::new().route(
            "/products/:symbol/candles",
            get(move |Path(symbol): Path<String>, Query(q): Query<HashMap<String, String>>| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push((symbol, q));
                    Json(json!([
                        [180, 9.0, 11.0, 10.0, 10.5, 300.0],
                        [60, 8.0, 10.0, 9.0, 9.5, 100.0],
                        [120, 8.5, 10.5, 9.5, 10.0, 200.0]
                    ]))
                }
            }),
        );
        let base = serve(router).await;

        let end = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 0).unwrap();
        let candles = client(&base).try_fetch("BTC-USD", 60, 10, end).await.unwrap();
        let ts: Vec<i64> = candles.iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![60, 120, 180]);
        assert_eq!(candles[0], Candle::new(60, 8.0, 10.0, 9.0, 9.5, 100.0));

        let seen = seen.lock().unwrap();
        let (symbol, q) = &seen[0];
        assert_eq!(symbol, "BTC-USD");
        assert_eq!(q["granularity"], "60");
        assert_eq!(q["start"], "2024-01-02T02:54:00Z");
        assert_eq!(q["end"], "2024-01-02T03:04:00Z");
    }

    #[tokio::test]
    async fn test_failures_collapse_to_empty_window() {
        let router = Router::new()
            .route("/products/DOWN-USD/candles", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route(
                "/products/ERR-USD/candles",
                get(|| async { Json(json!({ "message": "NotFound" })) }),
            )
            .route("/products/NONE-USD/candles", get(|| async { Json(Value::Array(vec![])) }))
            .route(
                "/products/BAD-USD/candles",
                get(|| async { Json(json!([[60, "x", 1.0, 1.0, 1.0, 1.0]])) }),
            );
        let base = serve(router).await;
        let client = client(&base);

        assert!(matches!(
            client.try_fetch("DOWN-USD", 60, 10, Utc::now()).await,
            Err(FetchError::Status(_))
        ));
        assert!(matches!(client.try_fetch("NONE-USD", 60, 10, Utc::now()).await, Err(FetchError::Empty)));

        for symbol in ["DOWN-USD", "ERR-USD", "NONE-USD", "BAD-USD", "MISSING-USD"] {
            assert!(client.fetch(symbol, 60, 10).await.is_empty(), "{symbol}");
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_empty() {
        // Port 9 on loopback: nothing listens there.
        let client = MarketDataClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(client.fetch("BTC-USD", 60, 10).await.is_empty());
    }
}
