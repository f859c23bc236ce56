//! Single and two-candle reversal patterns evaluated from OHLC shape.

use crate::candles::Candle;

fn body(c: &Candle) -> f64 {
    (c.close - c.open).abs()
}

fn upper_shadow(c: &Candle) -> f64 {
    c.high - c.open.max(c.close)
}

fn lower_shadow(c: &Candle) -> f64 {
    c.open.min(c.close) - c.low
}

fn is_bullish(c: &Candle) -> bool {
    c.close > c.open
}

fn is_bearish(c: &Candle) -> bool {
    c.close < c.open
}

/// Small body near the top of the range with a long lower wick.
pub fn is_hammer(c: &Candle) -> bool {
    let body = body(c);
    if body == 0.0 || c.high - c.low == 0.0 {
        return false;
    }
    lower_shadow(c) >= body * 2.0 && upper_shadow(c) < body * 0.5
}

/// The current body swallows the previous, opposite-coloured body.
pub fn is_engulfing(prev: &Candle, curr: &Candle) -> bool {
    if body(curr) <= body(prev) {
        return false;
    }
    let bullish = is_bearish(prev)
        && is_bullish(curr)
        && curr.open <= prev.close
        && curr.close >= prev.open;
    let bearish = is_bullish(prev)
        && is_bearish(curr)
        && curr.open >= prev.close
        && curr.close <= prev.open;
    bullish || bearish
}

pub fn hammer_flags(candles: &[Candle]) -> Vec<bool> {
    candles.iter().map(is_hammer).collect()
}

/// Index 0 has no predecessor and is never flagged.
pub fn engulfing_flags(candles: &[Candle]) -> Vec<bool> {
    std::iter::once(false)
        .chain(candles.windows(2).map(|w| is_engulfing(&w[0], &w[1])))
        .take(candles.len())
        .collect()
}
