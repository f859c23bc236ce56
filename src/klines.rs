use crate::candles::{CandleSeries, InputKline};
use crate::config::KlineConfig;
use crate::error::DataFetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

const KLINE_KEYS: &[&str] = &[
    "openTime",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "closeTime",
    "quoteAssetVolume",
    "numberOfTrades",
    "takerBuyBaseAssetVolume",
    "takerBuyQuoteAssetVolume",
    "ignore",
];

/// Intervals the klines endpoint accepts.
pub const INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

pub const MAX_LIMIT: u32 = 1000;

// "Way too much request weight used; IP banned until 1700000000000."
static BAN_UNTIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"until\s+(\d+)").expect("ban pattern is valid"));

/// What to fetch: the `limit` most recent candles of `symbol` at `interval`.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineRequest {
    pub symbol: String,
    pub interval: String,
    pub limit: u32,
}

impl KlineRequest {
    pub fn new(
        symbol: impl Into<String>,
        interval: impl Into<String>,
        limit: u32,
    ) -> Result<Self, DataFetchError> {
        let symbol = symbol.into();
        let interval = interval.into();

        if symbol.trim().is_empty() {
            return Err(DataFetchError::InvalidRequest("symbol is empty".into()));
        }
        if !INTERVALS.contains(&interval.as_str()) {
            return Err(DataFetchError::InvalidRequest(format!(
                "unsupported interval {interval:?}"
            )));
        }
        if limit == 0 || limit > MAX_LIMIT {
            return Err(DataFetchError::InvalidRequest(format!(
                "limit must be between 1 and {MAX_LIMIT}, got {limit}"
            )));
        }

        Ok(Self {
            symbol,
            interval,
            limit,
        })
    }

    fn query(&self) -> [(&'static str, String); 3] {
        [
            ("symbol", self.symbol.clone()),
            ("interval", self.interval.clone()),
            ("limit", self.limit.to_string()),
        ]
    }
}

impl Default for KlineRequest {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".into(),
            interval: "1m".into(),
            limit: 60,
        }
    }
}

/// Anything that can hand the pipeline a candle series.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch(&self, request: &KlineRequest) -> Result<CandleSeries, DataFetchError>;
}

/// Klines-style REST endpoint (Binance spot by default).
#[derive(Debug, Clone)]
pub struct BinanceKlines {
    client: Client,
    url: String,
}

impl BinanceKlines {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DataFetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &KlineConfig, timeout: Duration) -> Result<Self, DataFetchError> {
        Self::new(config.url.clone(), timeout)
    }
}

#[async_trait]
impl CandleSource for BinanceKlines {
    async fn fetch(&self, request: &KlineRequest) -> Result<CandleSeries, DataFetchError> {
        let response = self
            .client
            .get(&self.url)
            .query(&request.query())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::IM_A_TEAPOT || status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(DataFetchError::RateLimited {
                status: status.as_u16(),
                until: parse_ban_until(&body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataFetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw_klines: Vec<Vec<Value>> = response
            .json()
            .await
            .map_err(|e| DataFetchError::Malformed(e.to_string()))?;
        debug!(rows = raw_klines.len(), symbol = %request.symbol, "klines received");

        parse_klines(raw_klines, request.limit as usize)
    }
}

/// Keys each positional row and converts it into a [`CandleSeries`].
pub(crate) fn parse_klines(
    raw_klines: Vec<Vec<Value>>,
    limit: usize,
) -> Result<CandleSeries, DataFetchError> {
    let candles = raw_klines
        .into_iter()
        .map(|row| {
            if row.len() < 7 {
                return Err(DataFetchError::Malformed(format!(
                    "kline row has {} fields, expected at least 7",
                    row.len()
                )));
            }
            let keyed: Map<String, Value> = KLINE_KEYS
                .iter()
                .zip(row)
                .map(|(&key, val)| (key.to_string(), val))
                .collect();
            let raw: InputKline = serde_json::from_value(Value::Object(keyed))
                .map_err(|e| DataFetchError::Malformed(e.to_string()))?;
            raw.into_candle()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut series = CandleSeries::new(candles)?;
    series.keep_latest(limit);
    Ok(series)
}

fn parse_ban_until(body: &str) -> Option<DateTime<Utc>> {
    if !body.contains("-1003") {
        return None;
    }
    let caps = BAN_UNTIL.captures(body)?;
    let ms = caps.get(1)?.as_str().parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(ms)
}
