use crate::candles::CandleSeries;
use crate::error::IndicatorComputeError;
use crate::patterns;
use std::collections::BTreeMap;
use ta::Next;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};

pub const SMA_20: &str = "SMA_20";
pub const EMA_50: &str = "EMA_50";
pub const RSI: &str = "RSI";
pub const MACD: &str = "MACD";
pub const MACD_SIGNAL: &str = "MACD_Signal";
pub const MACD_HIST: &str = "MACD_Hist";
pub const HAMMER: &str = "Hammer";
pub const ENGULFING: &str = "Engulfing";

const SMA_WINDOW: usize = 20;
const EMA_WINDOW: usize = 50;
const RSI_WINDOW: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGN: usize = 9;

/// Values of one derived series, index-aligned with the candles.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValues {
    /// `None` where the warm-up window is not yet filled.
    Numeric(Vec<Option<f64>>),
    Flags(Vec<bool>),
}

impl IndicatorValues {
    pub fn len(&self) -> usize {
        match self {
            IndicatorValues::Numeric(v) => v.len(),
            IndicatorValues::Flags(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named indicator series computed over one [`CandleSeries`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndicatorSet {
    series: BTreeMap<&'static str, IndicatorValues>,
}

impl IndicatorSet {
    pub fn insert(&mut self, name: &'static str, values: IndicatorValues) {
        self.series.insert(name, values);
    }

    pub fn get(&self, name: &str) -> Option<&IndicatorValues> {
        self.series.get(name)
    }

    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.series.get(name)? {
            IndicatorValues::Numeric(v) => Some(v),
            IndicatorValues::Flags(_) => None,
        }
    }

    pub fn flags(&self, name: &str) -> Option<&[bool]> {
        match self.series.get(name)? {
            IndicatorValues::Flags(v) => Some(v),
            IndicatorValues::Numeric(_) => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.series.keys().copied()
    }

    /// Most recent defined value of a numeric series.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.numeric(name)?.iter().rev().find_map(|v| *v)
    }
}

fn validate(series: &CandleSeries) -> Result<(), IndicatorComputeError> {
    if series.is_empty() {
        return Err(IndicatorComputeError::EmptySeries);
    }
    for (index, c) in series.candles().iter().enumerate() {
        for (field, value) in [
            ("open", c.open),
            ("high", c.high),
            ("low", c.low),
            ("close", c.close),
            ("volume", c.volume),
        ] {
            if !value.is_finite() {
                return Err(IndicatorComputeError::NonFinite { index, field });
            }
        }
        if c.high < c.low {
            return Err(IndicatorComputeError::InvertedRange { index });
        }
    }
    Ok(())
}

fn param_err(e: ta::errors::TaError) -> IndicatorComputeError {
    IndicatorComputeError::Parameter(format!("{e:?}"))
}

/// Leading `warmup` positions are left undefined.
fn masked(values: impl Iterator<Item = f64>, warmup: usize) -> Vec<Option<f64>> {
    values
        .enumerate()
        .map(|(i, v)| (i >= warmup).then_some(v))
        .collect()
}

/// Computes every indicator the chart needs. Deterministic for identical input;
/// short series yield undefined leading values rather than an error.
pub fn compute(series: &CandleSeries) -> Result<IndicatorSet, IndicatorComputeError> {
    validate(series)?;

    let mut sma = SimpleMovingAverage::new(SMA_WINDOW).map_err(param_err)?;
    let mut ema = ExponentialMovingAverage::new(EMA_WINDOW).map_err(param_err)?;
    let mut rsi = RelativeStrengthIndex::new(RSI_WINDOW).map_err(param_err)?;
    let mut macd =
        MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGN).map_err(param_err)?;

    let closes: Vec<f64> = series.closes().collect();

    let mut set = IndicatorSet::default();
    set.insert(
        SMA_20,
        IndicatorValues::Numeric(masked(closes.iter().map(|&p| sma.next(p)), SMA_WINDOW - 1)),
    );
    set.insert(
        EMA_50,
        IndicatorValues::Numeric(masked(closes.iter().map(|&p| ema.next(p)), EMA_WINDOW - 1)),
    );

    // Zero average gain and loss leaves RSI undefined, so it stays None until
    // the first price change.
    let mut moved = false;
    let rsi_values = closes
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let value = rsi.next(p);
            if i > 0 && p != closes[i - 1] {
                moved = true;
            }
            (i >= RSI_WINDOW && moved).then_some(value)
        })
        .collect();
    set.insert(RSI, IndicatorValues::Numeric(rsi_values));

    let macd_out: Vec<_> = closes.iter().map(|&p| macd.next(p)).collect();
    let line_warmup = MACD_SLOW - 1;
    let signal_warmup = line_warmup + MACD_SIGN - 1;
    set.insert(
        MACD,
        IndicatorValues::Numeric(masked(macd_out.iter().map(|o| o.macd), line_warmup)),
    );
    set.insert(
        MACD_SIGNAL,
        IndicatorValues::Numeric(masked(macd_out.iter().map(|o| o.signal), signal_warmup)),
    );
    set.insert(
        MACD_HIST,
        IndicatorValues::Numeric(masked(macd_out.iter().map(|o| o.histogram), signal_warmup)),
    );

    set.insert(HAMMER, IndicatorValues::Flags(patterns::hammer_flags(series.candles())));
    set.insert(
        ENGULFING,
        IndicatorValues::Flags(patterns::engulfing_flags(series.candles())),
    );

    Ok(set)
}
