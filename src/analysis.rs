//! This module contains the core cycle pipeline logic.

use crate::candles::CandleSeries;
use crate::chart::{ChartArtifact, ChartRenderer};
use crate::error::{CycleError, RenderError, Stage};
use crate::indicators::{self, IndicatorSet};
use crate::klines::{CandleSource, KlineRequest};
use crate::storage_utils::AnalysisStore;
use crate::summary;
use crate::vision::{AnalysisResult, Analyzer};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, info, info_span};

/// Everything one cycle produced.
#[derive(Debug)]
pub struct CycleRecord {
    pub started_at: DateTime<Utc>,
    pub series: CandleSeries,
    pub indicators: IndicatorSet,
    pub chart: ChartArtifact,
    /// `None` for the chart-only variant.
    pub analysis: Option<AnalysisResult>,
    /// Where the analysis text was written, if it succeeded.
    pub saved_analysis: Option<PathBuf>,
}

/// The optional Analyzing stage and where its results go.
pub struct AnalysisStage {
    pub analyzer: Box<dyn Analyzer>,
    pub store: Box<dyn AnalysisStore>,
}

/// Fetch → compute → render → (analyze) → persist, for one symbol.
pub struct Pipeline {
    request: KlineRequest,
    source: Box<dyn CandleSource>,
    renderer: Arc<dyn ChartRenderer>,
    analysis: Option<AnalysisStage>,
    print_summary: bool,
}

impl Pipeline {
    /// The chart-only variant.
    pub fn new(
        request: KlineRequest,
        source: Box<dyn CandleSource>,
        renderer: Box<dyn ChartRenderer>,
    ) -> Self {
        Self {
            request,
            source,
            renderer: Arc::from(renderer),
            analysis: None,
            print_summary: false,
        }
    }

    /// Adds the Analyzing stage, turning this into the chart+analysis variant.
    pub fn with_analysis(mut self, analyzer: Box<dyn Analyzer>, store: Box<dyn AnalysisStore>) -> Self {
        self.analysis = Some(AnalysisStage { analyzer, store });
        self
    }

    pub fn with_summary(mut self, print_summary: bool) -> Self {
        self.print_summary = print_summary;
        self
    }

    pub fn request(&self) -> &KlineRequest {
        &self.request
    }

    pub fn analyzes(&self) -> bool {
        self.analysis.is_some()
    }

    /// Runs one full cycle. The first failing stage ends the cycle; nothing
    /// after it runs. A failed analysis is not a cycle failure, it just skips
    /// persistence.
    pub async fn run_cycle(&self, started_at: DateTime<Utc>) -> Result<CycleRecord, CycleError> {
        let span = info_span!(
            "cycle",
            symbol = %self.request.symbol,
            interval = %self.request.interval,
            at = started_at.timestamp(),
        );
        self.stages(started_at).instrument(span).await
    }

    async fn stages(&self, started_at: DateTime<Utc>) -> Result<CycleRecord, CycleError> {
        let series = self
            .source
            .fetch(&self.request)
            .await
            .map_err(|e| CycleError::new(Stage::Fetching, e))?;
        info!(candles = series.len(), "candles fetched");

        let indicators =
            indicators::compute(&series).map_err(|e| CycleError::new(Stage::Computing, e))?;

        let (series, indicators, chart) = self
            .render(series, indicators, started_at)
            .await
            .map_err(|e| CycleError::new(Stage::Rendering, e))?;
        info!(path = %chart.path.display(), "chart saved");

        if self.print_summary {
            let title = format!("{} {}", self.request.symbol, self.request.interval);
            if let Some(table) = summary::render(&title, &series, &indicators) {
                println!("{table}");
            }
        }

        let mut saved_analysis = None;
        let analysis = match &self.analysis {
            None => None,
            Some(stage) => {
                let result = stage.analyzer.analyze(&chart.path).await;
                if let Some(text) = result.text() {
                    let path = stage
                        .store
                        .save_analysis(text, started_at)
                        .await
                        .map_err(|e| CycleError::new(Stage::Persisting, e))?;
                    info!(path = %path.display(), "analysis saved");
                    saved_analysis = Some(path);
                }
                Some(result)
            }
        };

        Ok(CycleRecord {
            started_at,
            series,
            indicators,
            chart,
            analysis,
            saved_analysis,
        })
    }

    /// Drawing and PNG encoding block, so they run on the blocking pool where
    /// the cycle timeout can still fire while the render is in progress.
    async fn render(
        &self,
        series: CandleSeries,
        indicators: IndicatorSet,
        started_at: DateTime<Utc>,
    ) -> Result<(CandleSeries, IndicatorSet, ChartArtifact), RenderError> {
        let renderer = Arc::clone(&self.renderer);
        tokio::task::spawn_blocking(move || -> Result<_, RenderError> {
            let chart = renderer.render(&series, &indicators, started_at)?;
            Ok((series, indicators, chart))
        })
        .await
        .map_err(|e| RenderError::Backend(format!("render task failed: {e}")))?
    }
}
