use crate::candles::CandleSeries;
use crate::indicators::{
    EMA_50, ENGULFING, HAMMER, IndicatorSet, MACD, MACD_HIST, MACD_SIGNAL, RSI, SMA_20,
};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

fn rsi_color(rsi: f64) -> Color {
    if rsi >= 70.0 {
        Color::Red
    } else if rsi <= 30.0 {
        Color::Green
    } else {
        Color::Grey
    }
}

fn value_cell(value: Option<f64>) -> Cell {
    match value {
        Some(v) => Cell::new(format!("{v:.2}")).set_alignment(CellAlignment::Right),
        None => Cell::new("n/a")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
    }
}

/// Latest candle and indicator readings as a console table.
pub fn render(title: &str, series: &CandleSeries, indicators: &IndicatorSet) -> Option<String> {
    let last = series.last()?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Indicator").add_attribute(Attribute::Bold),
            Cell::new("Latest")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
        ]);

    table.add_row(vec![
        Cell::new("Close").fg(Color::Cyan),
        value_cell(Some(last.close)),
    ]);
    for name in [SMA_20, EMA_50, MACD, MACD_SIGNAL, MACD_HIST] {
        table.add_row(vec![Cell::new(name), value_cell(indicators.latest(name))]);
    }

    let rsi = indicators.latest(RSI);
    let mut rsi_cell = value_cell(rsi);
    if let Some(v) = rsi {
        rsi_cell = rsi_cell.fg(rsi_color(v));
    }
    table.add_row(vec![Cell::new(RSI), rsi_cell]);

    for name in [HAMMER, ENGULFING] {
        let hits = indicators
            .flags(name)
            .map(|f| f.iter().filter(|&&hit| hit).count())
            .unwrap_or(0);
        let cell = Cell::new(format!("{hits} in window")).set_alignment(CellAlignment::Right);
        let cell = if hits > 0 { cell.fg(Color::Yellow) } else { cell };
        table.add_row(vec![Cell::new(name), cell]);
    }

    let time_str = last.open_time.format("%d-%m-%Y %H:%M:%S");
    Some(format!("\n{title} (candle opened {time_str} UTC)\n{table}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candles::tests::candle;
    use crate::indicators;

    #[test]
    fn lists_every_indicator() {
        let series = CandleSeries::new(
            (0..30).map(|i| candle(i, 100.0, 101.0, 99.0, 100.0 + i as f64 * 0.1)).collect(),
        )
        .unwrap();
        let set = indicators::compute(&series).unwrap();

        let out = render("BTCUSDT 1m", &series, &set).unwrap();
        for name in ["Close", SMA_20, EMA_50, RSI, MACD, MACD_SIGNAL, MACD_HIST, HAMMER, ENGULFING] {
            assert!(out.contains(name), "{name} missing from\n{out}");
        }
        assert!(out.contains("n/a"), "EMA_50 is still warming up");
        // last candle opens 29 minutes after 22:13:20
        assert!(out.contains("candle opened 14-11-2023 22:42:20 UTC"), "{out}");
    }

    #[test]
    fn empty_series_has_no_summary() {
        assert!(render("x", &CandleSeries::default(), &IndicatorSet::default()).is_none());
    }
}
