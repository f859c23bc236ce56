use crate::error::{DataFetchError, SeriesError};
use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

// --- Raw kline rows ---

/// One kline row after its positional fields have been keyed by name.
/// Binance sends prices as strings, so numeric fields go through the lenient visitor.
#[derive(Deserialize, Debug)]
pub(crate) struct InputKline {
    #[serde(rename = "openTime")]
    open_time: i64,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    open: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    high: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    low: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    close: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    volume: Option<f64>,
    #[serde(rename = "closeTime")]
    close_time: i64,
}

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.trim().is_empty() {
            Ok(None)
        } else {
            v.trim().parse::<f64>().map(Some).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

fn deserialize_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

// --- Domain types ---

/// One OHLCV bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: DateTime<Utc>,
}

impl InputKline {
    pub(crate) fn into_candle(self) -> Result<Candle, DataFetchError> {
        let field = |value: Option<f64>, name: &str| {
            value.ok_or_else(|| {
                DataFetchError::Malformed(format!(
                    "kline opened at {} has no {name} value",
                    self.open_time
                ))
            })
        };
        let millis = |ms: i64| {
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| DataFetchError::Malformed(format!("timestamp {ms} is out of range")))
        };

        Ok(Candle {
            open_time: millis(self.open_time)?,
            open: field(self.open, "open")?,
            high: field(self.high, "high")?,
            low: field(self.low, "low")?,
            close: field(self.close, "close")?,
            volume: field(self.volume, "volume")?,
            close_time: millis(self.close_time)?,
        })
    }
}

/// Candles ordered oldest to newest with strictly increasing open times.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self, SeriesError> {
        for (index, pair) in candles.windows(2).enumerate() {
            if pair[1].open_time <= pair[0].open_time {
                return Err(SeriesError::OutOfOrder {
                    index: index + 1,
                    at: pair[1].open_time,
                });
            }
        }
        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.candles.iter().map(|c| c.close)
    }

    /// Drops the oldest candles so at most `limit` remain.
    pub fn keep_latest(&mut self, limit: usize) {
        if self.candles.len() > limit {
            self.candles.drain(..self.candles.len() - limit);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    /// A one-minute candle `minutes` after a fixed origin.
    pub(crate) fn candle(minutes: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let open_time = DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(minutes);
        Candle {
            open_time,
            open,
            high,
            low,
            close,
            volume: 1.0,
            close_time: open_time + Duration::seconds(59),
        }
    }

    #[test]
    fn parses_string_prices_and_millisecond_times() {
        let raw: InputKline = serde_json::from_value(json!({
            "openTime": 1_700_000_000_000_i64,
            "open": "37000.10",
            "high": "37010.00",
            "low": 36990.5,
            "close": "37005",
            "volume": "12.5",
            "closeTime": 1_700_000_059_999_i64,
        }))
        .unwrap();

        let candle = raw.into_candle().unwrap();
        assert_eq!(candle.open, 37000.10);
        assert_eq!(candle.low, 36990.5);
        assert_eq!(candle.open_time.timestamp(), 1_700_000_000);
        assert_eq!(candle.close_time.timestamp_millis(), 1_700_000_059_999);
    }

    #[test]
    fn empty_price_string_is_malformed() {
        let raw: InputKline = serde_json::from_value(json!({
            "openTime": 0, "open": "1", "high": "1", "low": "1", "close": "",
            "volume": "1", "closeTime": 59_999,
        }))
        .unwrap();

        assert!(matches!(raw.into_candle(), Err(DataFetchError::Malformed(_))));
    }

    #[test]
    fn non_numeric_price_is_rejected_by_the_parser() {
        let raw = serde_json::from_value::<InputKline>(json!({
            "openTime": 0, "open": "abc", "high": "1", "low": "1", "close": "1",
            "volume": "1", "closeTime": 59_999,
        }));
        assert!(raw.is_err());
    }

    #[test]
    fn series_rejects_duplicate_timestamps() {
        let err = CandleSeries::new(vec![
            candle(0, 1.0, 1.0, 1.0, 1.0),
            candle(1, 1.0, 1.0, 1.0, 1.0),
            candle(1, 1.0, 1.0, 1.0, 1.0),
        ])
        .unwrap_err();
        assert!(matches!(err, SeriesError::OutOfOrder { index: 2, .. }));
    }

    #[test]
    fn keep_latest_trims_oldest() {
        let mut series =
            CandleSeries::new((0..5).map(|i| candle(i, 1.0, 1.0, 1.0, i as f64)).collect()).unwrap();
        series.keep_latest(3);
        assert_eq!(series.closes().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }
}
