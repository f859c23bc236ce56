//! Error types for every stage of a chart cycle.
//!
//! Each stage owns its own enum so callers can match on what actually went
//! wrong; [`CycleError`] ties a stage failure to the [`Stage`] it happened in.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while pulling candles from the market data API.
#[derive(Debug, Error)]
pub enum DataFetchError {
    /// The request itself can never succeed (bad interval, zero limit, ...).
    #[error("invalid kline request: {0}")]
    InvalidRequest(String),

    /// Network failure, timeout, or a body that could not be read.
    #[error("market data request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// HTTP 418/429 from the exchange.
    #[error("rate limited by market data API (status {status}, banned until {until:?})")]
    RateLimited {
        status: u16,
        until: Option<DateTime<Utc>>,
    },

    /// Any other non-2xx status.
    #[error("market data API returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The payload did not match the kline row layout.
    #[error("malformed kline payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// Violations of the candle series ordering invariant.
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("candle {index} at {at} is not after the previous candle")]
    OutOfOrder { index: usize, at: DateTime<Utc> },
}

/// Failures while deriving indicator series from candles.
#[derive(Debug, Error, PartialEq)]
pub enum IndicatorComputeError {
    #[error("cannot compute indicators over an empty series")]
    EmptySeries,

    #[error("candle {index} has a non-finite {field} value")]
    NonFinite { index: usize, field: &'static str },

    #[error("candle {index} has high below low")]
    InvertedRange { index: usize },

    #[error("invalid indicator parameters: {0}")]
    Parameter(String),
}

/// Failures while drawing the chart image.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("indicator set is missing the {0} series")]
    MissingSeries(&'static str),

    #[error("{name} has {actual} values but the series has {expected} candles")]
    Misaligned {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("nothing to render: candle series is empty")]
    Empty,

    #[error("chart output directory unavailable: {0}")]
    Io(#[from] std::io::Error),

    #[error("drawing backend failed: {0}")]
    Backend(String),
}

/// Reasons a remote chart analysis did not produce text.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("vision endpoint credentials are not configured ({0} missing)")]
    MissingCredentials(&'static str),

    #[error("could not read chart image: {0}")]
    Image(#[from] std::io::Error),

    #[error("vision request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("vision endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("vision response is malformed: {0}")]
    Malformed(String),
}

/// Failures while persisting cycle outputs.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("refusing to overwrite existing result {0}")]
    AlreadyExists(PathBuf),

    #[error("result store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid or unparsable startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// The states a cycle passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Computing,
    Rendering,
    Analyzing,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Computing => "computing",
            Stage::Rendering => "rendering",
            Stage::Analyzing => "analyzing",
            Stage::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] DataFetchError),
    #[error(transparent)]
    Compute(#[from] IndicatorComputeError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A cycle abandoned at `stage`.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct CycleError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl CycleError {
    pub fn new(stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}
