//! Periodic chart capture: fetch candles, derive indicators, render a chart
//! image and optionally ask a hosted image-to-text model to describe it.

pub mod analysis;
pub mod candles;
pub mod chart;
pub mod config;
pub mod daemon;
pub mod error;
pub mod indicators;
pub mod klines;
pub mod patterns;
pub mod scheduler;
pub mod storage_utils;
pub mod summary;
pub mod telemetry;
pub mod vision;

pub use analysis::{CycleRecord, Pipeline};
pub use candles::{Candle, CandleSeries};
pub use chart::{ChartArtifact, ChartRenderer, PlottersRenderer};
pub use config::AppConfig;
pub use error::{CycleError, Stage};
pub use indicators::IndicatorSet;
pub use klines::{BinanceKlines, CandleSource, KlineRequest};
pub use scheduler::{RunStats, Scheduler};
pub use storage_utils::{AnalysisStore, ResultStore};
pub use vision::{AnalysisResult, AnalysisStatus, Analyzer, VisionAnalyzer};
