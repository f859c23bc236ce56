//! Wiring shared by both long-running binaries.

use crate::analysis::Pipeline;
use crate::chart::PlottersRenderer;
use crate::config::AppConfig;
use crate::klines::BinanceKlines;
use crate::scheduler::{self, Scheduler};
use crate::storage_utils::ResultStore;
use crate::vision::VisionAnalyzer;
use anyhow::{Context, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    ChartOnly,
    ChartWithAnalysis,
}

/// Builds the pipeline for `variant` from validated configuration.
pub fn build_pipeline(config: &AppConfig, variant: Variant) -> Result<Pipeline> {
    let request = config.klines.request();
    let source = BinanceKlines::from_config(&config.klines, config.schedule.http_timeout)
        .context("building market data client")?;
    let title = format!("{} {}", request.symbol, request.interval);
    let renderer = PlottersRenderer::new(&config.output.chart_dir, title);

    let mut pipeline = Pipeline::new(request, Box::new(source), Box::new(renderer))
        .with_summary(config.output.print_summary);

    if variant == Variant::ChartWithAnalysis {
        if config.vision.api_key.is_none() || config.vision.model_url.is_none() {
            warn!("HUGGINGFACE_API_KEY or MODEL_URL not set, every analysis will fail");
        }
        let analyzer = VisionAnalyzer::new(&config.vision).context("building vision client")?;
        let store = ResultStore::new(&config.output.analysis_dir);
        pipeline = pipeline.with_analysis(Box::new(analyzer), Box::new(store));
    }

    Ok(pipeline)
}

/// Loads configuration, then runs cycles until Ctrl-C or SIGTERM.
pub async fn run(variant: Variant) -> Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    info!(
        symbol = %config.klines.symbol,
        interval = %config.klines.interval,
        limit = config.klines.limit,
        ?variant,
        "starting"
    );

    let pipeline = build_pipeline(&config, variant)?;
    let stats = Scheduler::from_config(&config.schedule)
        .run(&pipeline, scheduler::shutdown_signal())
        .await;

    info!(
        attempted = stats.attempted,
        completed = stats.completed,
        failed = stats.failed,
        timed_out = stats.timed_out,
        "stopped"
    );
    Ok(())
}
