//! Four-panel chart image: price with moving averages and pattern markers,
//! volume, MACD, and RSI with its 30/70 guides.

use crate::candles::CandleSeries;
use crate::error::RenderError;
use crate::indicators::{
    EMA_50, ENGULFING, HAMMER, IndicatorSet, MACD, MACD_HIST, MACD_SIGNAL, RSI, SMA_20,
};
use chrono::{DateTime, Utc};
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WIDTH: u32 = 1400;
const HEIGHT: u32 = 1100;
const PRICE_PANEL: i32 = 500;
const VOLUME_PANEL: i32 = 150;
const MACD_PANEL: i32 = 220;

const DIM_GRAY: RGBColor = RGBColor(105, 105, 105);
const ORANGE: RGBColor = RGBColor(255, 165, 0);
const CANDLE_UP: RGBColor = RGBColor(38, 166, 91);
const CANDLE_DOWN: RGBColor = RGBColor(214, 48, 49);

/// A chart written to disk. Never modified after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartArtifact {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

pub trait ChartRenderer: Send + Sync {
    /// Renders the chart for the cycle started at `at`.
    fn render(
        &self,
        series: &CandleSeries,
        indicators: &IndicatorSet,
        at: DateTime<Utc>,
    ) -> Result<ChartArtifact, RenderError>;
}

/// `screenshot_<unix-seconds>.png`. Two renders within the same second share a
/// name and the later one replaces the earlier.
pub fn chart_file_name(at: DateTime<Utc>) -> String {
    format!("screenshot_{}.png", at.timestamp())
}

// Keeps the .png extension: the bitmap backend picks its encoder from it.
fn partial_file_name(at: DateTime<Utc>) -> String {
    format!("screenshot_{}.partial.png", at.timestamp())
}

/// Bitmap renderer writing PNG files into one output directory.
#[derive(Debug, Clone)]
pub struct PlottersRenderer {
    output_dir: PathBuf,
    title: String,
}

impl PlottersRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            title: title.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

struct Panels<'a> {
    sma: &'a [Option<f64>],
    ema: &'a [Option<f64>],
    macd: &'a [Option<f64>],
    signal: &'a [Option<f64>],
    hist: &'a [Option<f64>],
    rsi: &'a [Option<f64>],
    hammer: &'a [bool],
    engulfing: &'a [bool],
}

impl<'a> Panels<'a> {
    fn collect(indicators: &'a IndicatorSet, expected: usize) -> Result<Self, RenderError> {
        let numeric = |name: &'static str| {
            let values = indicators.numeric(name).ok_or(RenderError::MissingSeries(name))?;
            aligned(name, values, expected)
        };
        let flags = |name: &'static str| {
            let values = indicators.flags(name).ok_or(RenderError::MissingSeries(name))?;
            aligned(name, values, expected)
        };

        Ok(Self {
            sma: numeric(SMA_20)?,
            ema: numeric(EMA_50)?,
            macd: numeric(MACD)?,
            signal: numeric(MACD_SIGNAL)?,
            hist: numeric(MACD_HIST)?,
            rsi: numeric(RSI)?,
            hammer: flags(HAMMER)?,
            engulfing: flags(ENGULFING)?,
        })
    }
}

fn aligned<'a, T>(
    name: &'static str,
    values: &'a [T],
    expected: usize,
) -> Result<&'a [T], RenderError> {
    if values.len() != expected {
        return Err(RenderError::Misaligned {
            name,
            expected,
            actual: values.len(),
        });
    }
    Ok(values)
}

fn backend<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Backend(e.to_string())
}

/// Defined points of a series, x = candle index.
fn points(values: &[Option<f64>]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
        .collect()
}

fn bounds<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<(f64, f64)> {
    values.into_iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Pads a range so flat data still gets a drawable axis.
fn padded((lo, hi): (f64, f64), ratio: f64) -> (f64, f64) {
    let span = hi - lo;
    let scale = lo.abs().max(hi.abs()).max(1.0);
    let pad = if span > scale * 1e-9 { span * ratio } else { scale * 0.01 };
    (lo - pad, hi + pad)
}

impl ChartRenderer for PlottersRenderer {
    fn render(
        &self,
        series: &CandleSeries,
        indicators: &IndicatorSet,
        at: DateTime<Utc>,
    ) -> Result<ChartArtifact, RenderError> {
        if series.is_empty() {
            return Err(RenderError::Empty);
        }
        let panels = Panels::collect(indicators, series.len())?;

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(chart_file_name(at));
        if path.exists() {
            warn!(path = %path.display(), "chart for this second already exists, replacing it");
        }

        // Draw beside the final name so a failed render never touches an
        // existing chart.
        let partial = self.output_dir.join(partial_file_name(at));
        let drawn = draw(&partial, &self.title, series, &panels)
            .and_then(|()| std::fs::rename(&partial, &path).map_err(RenderError::from));
        if let Err(e) = drawn {
            let _ = std::fs::remove_file(&partial);
            return Err(e);
        }
        debug!(path = %path.display(), "chart rendered");

        Ok(ChartArtifact {
            path,
            created_at: at,
        })
    }
}

fn draw(
    path: &Path,
    title: &str,
    series: &CandleSeries,
    panels: &Panels<'_>,
) -> Result<(), RenderError> {
    let candles = series.candles();
    let n = candles.len() as f64;
    let x_range = -1.0..n;
    let x_label = |x: &f64| {
        let i = x.round();
        if i < 0.0 || i >= n {
            return String::new();
        }
        candles[i as usize].open_time.format("%H:%M").to_string()
    };

    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(backend)?;
    let (price_area, lower) = root.split_vertically(PRICE_PANEL);
    let (volume_area, lower) = lower.split_vertically(VOLUME_PANEL);
    let (macd_area, rsi_area) = lower.split_vertically(MACD_PANEL);

    // --- price panel ---
    let price_range = bounds(candles.iter().flat_map(|c| [&c.low, &c.high]))
        .map(|r| padded(r, 0.12))
        .ok_or(RenderError::Empty)?;
    let mut price = ChartBuilder::on(&price_area)
        .caption(title, ("sans-serif", 24).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range.clone(), price_range.0..price_range.1)
        .map_err(backend)?;
    price
        .configure_mesh()
        .x_labels(8)
        .x_label_formatter(&x_label)
        .y_desc("Price")
        .draw()
        .map_err(backend)?;

    price
        .draw_series(candles.iter().enumerate().map(|(i, c)| {
            CandleStick::new(
                i as f64,
                c.open,
                c.high,
                c.low,
                c.close,
                CANDLE_UP.filled(),
                CANDLE_DOWN.filled(),
                8,
            )
        }))
        .map_err(backend)?;

    price
        .draw_series(LineSeries::new(points(panels.sma), &BLUE))
        .map_err(backend)?
        .label("SMA 20")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    price
        .draw_series(LineSeries::new(points(panels.ema), &RED))
        .map_err(backend)?
        .label("EMA 50")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    for (name, flags, color) in [
        (HAMMER, panels.hammer, BLUE),
        (ENGULFING, panels.engulfing, RED),
    ] {
        price
            .draw_series(
                flags
                    .iter()
                    .enumerate()
                    .filter(|(_, flagged)| **flagged)
                    .map(|(i, _)| {
                        EmptyElement::at((i as f64, candles[i].high))
                            + Circle::new((0, -10), 4, color.filled())
                            + Text::new(name, (-24, -32), ("sans-serif", 14).into_font().color(&color))
                    }),
            )
            .map_err(backend)?;
    }

    price
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(backend)?;

    // --- volume panel ---
    let max_volume = candles.iter().map(|c| c.volume).fold(0.0, f64::max);
    let volume_top = if max_volume > 0.0 { max_volume * 1.1 } else { 1.0 };
    let mut volume = ChartBuilder::on(&volume_area)
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range.clone(), 0.0..volume_top)
        .map_err(backend)?;
    volume
        .configure_mesh()
        .x_labels(8)
        .x_label_formatter(&x_label)
        .y_labels(3)
        .y_desc("Volume")
        .draw()
        .map_err(backend)?;
    volume
        .draw_series(candles.iter().enumerate().map(|(i, c)| {
            let x = i as f64;
            let color = if c.close >= c.open { CANDLE_UP } else { CANDLE_DOWN };
            Rectangle::new([(x - 0.35, 0.0), (x + 0.35, c.volume)], color.mix(0.6).filled())
        }))
        .map_err(backend)?;

    // --- MACD panel ---
    let macd_range = bounds(
        panels
            .macd
            .iter()
            .chain(panels.signal)
            .chain(panels.hist)
            .flatten()
            .chain(std::iter::once(&0.0)),
    )
    .map(|r| padded(r, 0.1))
    .unwrap_or((-1.0, 1.0));
    let mut macd = ChartBuilder::on(&macd_area)
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range.clone(), macd_range.0..macd_range.1)
        .map_err(backend)?;
    macd.configure_mesh()
        .x_labels(8)
        .x_label_formatter(&x_label)
        .y_desc("MACD")
        .draw()
        .map_err(backend)?;
    macd.draw_series(
        points(panels.hist)
            .into_iter()
            .map(|(x, h)| Rectangle::new([(x - 0.35, 0.0), (x + 0.35, h)], DIM_GRAY.filled())),
    )
    .map_err(backend)?;
    macd.draw_series(LineSeries::new(points(panels.macd), &GREEN))
        .map_err(backend)?;
    macd.draw_series(LineSeries::new(points(panels.signal), &ORANGE))
        .map_err(backend)?;

    // --- RSI panel ---
    let mut rsi = ChartBuilder::on(&rsi_area)
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(80)
        .build_cartesian_2d(x_range, 0.0..100.0)
        .map_err(backend)?;
    rsi.configure_mesh()
        .x_labels(8)
        .x_label_formatter(&x_label)
        .y_desc("RSI")
        .draw()
        .map_err(backend)?;
    for (level, color) in [(30.0, GREEN), (70.0, RED)] {
        rsi.draw_series(LineSeries::new(
            vec![(-1.0, level), (n, level)],
            color.mix(0.7).stroke_width(1),
        ))
        .map_err(backend)?;
    }
    rsi.draw_series(LineSeries::new(points(panels.rsi), &MAGENTA))
        .map_err(backend)?;

    root.present().map_err(backend)?;
    Ok(())
}
