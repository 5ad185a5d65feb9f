/// Average True Range (ATR) series
///
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Smoothed with Wilder's method, which is what Supertrend expects.
use crate::models::Candle;

/// Calculate the ATR series for the given candles
///
/// Returns one value per candle starting at index `period` (the first index
/// with enough true ranges behind it), so `series[i]` belongs to
/// `candles[period + i]`. Empty when there is insufficient data.
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        true_ranges.push(tr);
    }

    let mut series = Vec::with_capacity(true_ranges.len() - period + 1);

    // First ATR is a simple average of the first `period` true ranges
    let mut atr: f64 = true_ranges.iter().take(period).sum::<f64>() / period as f64;
    series.push(atr);

    // Wilder's smoothing for the rest
    for tr in &true_ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        series.push(atr);
    }

    series
}
