#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use chart_sentinel::error::{DataFetchError, RenderError, StoreError};
use chart_sentinel::{
    AnalysisResult, AnalysisStatus, AnalysisStore, Analyzer, Candle, CandleSeries, CandleSource,
    ChartArtifact, ChartRenderer, IndicatorSet, KlineRequest,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A local URL nothing is listening on.
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/generate")
}

/// Binance-shaped kline rows, one minute apart, flat candles at each close.
pub fn kline_rows(closes: &[f64]) -> Value {
    let start = 1_700_000_000_000_i64;
    let rows: Vec<Value> = closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let open_ms = start + i as i64 * 60_000;
            let price = format!("{close:.2}");
            json!([
                open_ms, price, price, price, price, "10.0",
                open_ms + 59_999, "0", 7, "0", "0", "0"
            ])
        })
        .collect();
    Value::Array(rows)
}

pub fn flat_series(len: usize, price: f64) -> CandleSeries {
    let origin = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    CandleSeries::new(
        (0..len)
            .map(|i| {
                let open_time = origin + Duration::minutes(i as i64);
                Candle {
                    open_time,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: 1.0,
                    close_time: open_time + Duration::seconds(59),
                }
            })
            .collect(),
    )
    .unwrap()
}

#[derive(Clone, Default)]
pub struct Calls(pub Arc<AtomicUsize>);

impl Calls {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub enum SourceMode {
    Series(CandleSeries),
    Unavailable,
}

pub struct FakeSource {
    pub mode: SourceMode,
    pub calls: Calls,
}

#[async_trait]
impl CandleSource for FakeSource {
    async fn fetch(&self, _request: &KlineRequest) -> Result<CandleSeries, DataFetchError> {
        self.calls.hit();
        match &self.mode {
            SourceMode::Series(series) => Ok(series.clone()),
            SourceMode::Unavailable => Err(DataFetchError::Status {
                status: 503,
                body: "maintenance".into(),
            }),
        }
    }
}

/// Records calls and either fails or pretends to write a chart.
pub struct FakeRenderer {
    pub fail: bool,
    pub calls: Calls,
}

impl ChartRenderer for FakeRenderer {
    fn render(
        &self,
        _series: &CandleSeries,
        _indicators: &IndicatorSet,
        at: DateTime<Utc>,
    ) -> Result<ChartArtifact, RenderError> {
        self.calls.hit();
        if self.fail {
            return Err(RenderError::Backend("font cache unavailable".into()));
        }
        Ok(ChartArtifact {
            path: PathBuf::from(format!("screenshot_{}.png", at.timestamp())),
            created_at: at,
        })
    }
}

pub struct FakeAnalyzer {
    pub text: Option<String>,
    pub calls: Calls,
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, image: &Path) -> AnalysisResult {
        self.calls.hit();
        let status = match &self.text {
            Some(text) => AnalysisStatus::Success(text.clone()),
            None => AnalysisStatus::Skipped("no model".into()),
        };
        AnalysisResult {
            chart: image.to_path_buf(),
            status,
            completed_at: Utc::now(),
        }
    }
}

pub struct FakeStore {
    pub fail: bool,
    pub calls: Calls,
}

#[async_trait]
impl AnalysisStore for FakeStore {
    async fn save_analysis(&self, _text: &str, at: DateTime<Utc>) -> Result<PathBuf, StoreError> {
        self.calls.hit();
        if self.fail {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "disk full",
            )));
        }
        Ok(PathBuf::from(format!("logs/analysis_{}.txt", at.timestamp())))
    }
}
