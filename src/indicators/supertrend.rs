/// Supertrend trend-following overlay
///
/// Builds upper/lower bands at `multiplier * ATR` around the candle midpoint
/// and tracks which band price is trading on. The direction flips when the
/// close crosses the opposite band; the trend line is the band currently
/// backing the position.
use crate::indicators::atr::calculate_atr_series;
use crate::models::{Candle, Direction, IndicatorFrame};

/// Calculate Supertrend frames for the given candles
///
/// Returns one frame per candle starting at index `period`, aligned with the
/// input. Empty when the window is too short. The first frame seeds
/// direction Up; only direction *changes* matter downstream, so the seed
/// cannot fire a spurious signal.
pub fn calculate_supertrend(
    candles: &[Candle],
    period: usize,
    multiplier: f64,
) -> Vec<IndicatorFrame> {
    let atr_series = calculate_atr_series(candles, period);
    if atr_series.is_empty() {
        return Vec::new();
    }

    let mut frames = Vec::with_capacity(atr_series.len());

    let mut final_upper = 0.0;
    let mut final_lower = 0.0;
    let mut direction = Direction::Up;
    let mut prev_close = 0.0;

    for (offset, atr) in atr_series.iter().enumerate() {
        let candle = &candles[period + offset];
        let mid = (candle.high + candle.low) / 2.0;
        let basic_upper = mid + multiplier * atr;
        let basic_lower = mid - multiplier * atr;

        if offset == 0 {
            final_upper = basic_upper;
            final_lower = basic_lower;
        } else {
            // Bands only ratchet toward price unless the previous close
            // already broke through them
            final_upper = if basic_upper < final_upper || prev_close > final_upper {
                basic_upper
            } else {
                final_upper
            };
            final_lower = if basic_lower > final_lower || prev_close < final_lower {
                basic_lower
            } else {
                final_lower
            };

            direction = match direction {
                Direction::Up if candle.close < final_lower => Direction::Down,
                Direction::Down if candle.close > final_upper => Direction::Up,
                unchanged => unchanged,
            };
        }

        let trend = match direction {
            Direction::Up => final_lower,
            Direction::Down => final_upper,
        };

        frames.push(IndicatorFrame {
            timestamp: candle.timestamp,
            close: candle.close,
            trend,
            direction,
        });

        prev_close = candle.close;
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn create_test_candles(prices: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 900, 0).unwrap(),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    /// Steady uptrend with small ranges around the close
    fn uptrend(len: usize) -> Vec<(f64, f64, f64, f64)> {
        (0..len)
            .map(|i| {
                let close = 100.0 + i as f64;
                (close - 0.5, close + 1.0, close - 1.0, close)
            })
            .collect()
    }

    #[test]
    fn test_too_short_window_yields_no_frames() {
        let candles = create_test_candles(&uptrend(5));
        assert!(calculate_supertrend(&candles, 10, 3.0).is_empty());
    }

    #[test]
    fn test_frames_align_with_candles() {
        let candles = create_test_candles(&uptrend(30));
        let frames = calculate_supertrend(&candles, 10, 3.0);

        assert_eq!(frames.len(), 20);
        assert_eq!(frames[0].timestamp, candles[10].timestamp);
        assert_eq!(frames.last().unwrap().timestamp, candles.last().unwrap().timestamp);
    }

    #[test]
    fn test_uptrend_stays_up() {
        let candles = create_test_candles(&uptrend(40));
        let frames = calculate_supertrend(&candles, 10, 3.0);

        assert!(frames.iter().all(|f| f.direction == Direction::Up));
        // Trend line rides below price in an uptrend
        for frame in &frames {
            assert!(frame.trend < frame.close);
        }
    }

    #[test]
    fn test_crash_flips_direction_down() {
        let mut prices = uptrend(30);
        // Hard break far below any plausible lower band (ATR ~= 2 here)
        for i in 0..3 {
            let close = 80.0 - i as f64 * 5.0;
            prices.push((close + 2.0, close + 3.0, close - 1.0, close));
        }

        let candles = create_test_candles(&prices);
        let frames = calculate_supertrend(&candles, 10, 3.0);

        assert_eq!(frames.last().unwrap().direction, Direction::Down);
        // Flip happened after the uptrend section
        let first_down = frames.iter().position(|f| f.direction == Direction::Down);
        assert!(first_down.unwrap() >= 19);
    }

    #[test]
    fn test_recovery_flips_back_up() {
        let mut prices = uptrend(30);
        for i in 0..5 {
            let close = 80.0 - i as f64 * 5.0;
            prices.push((close + 2.0, close + 3.0, close - 1.0, close));
        }
        // V-shaped recovery well above the upper band
        for i in 0..8 {
            let close = 110.0 + i as f64 * 5.0;
            prices.push((close - 2.0, close + 1.0, close - 3.0, close));
        }

        let candles = create_test_candles(&prices);
        let frames = calculate_supertrend(&candles, 10, 3.0);

        let directions: Vec<_> = frames.iter().map(|f| f.direction).collect();
        assert!(directions.contains(&Direction::Down));
        assert_eq!(*directions.last().unwrap(), Direction::Up);
    }

    #[test]
    fn test_trend_line_sits_on_active_band() {
        let mut prices = uptrend(30);
        for i in 0..3 {
            let close = 70.0 - i as f64 * 5.0;
            prices.push((close + 2.0, close + 3.0, close - 1.0, close));
        }

        let candles = create_test_candles(&prices);
        let frames = calculate_supertrend(&candles, 10, 3.0);

        for frame in frames {
            match frame.direction {
                // Up holds only while close stays at or above the lower band
                Direction::Up => assert!(frame.trend <= frame.close),
                Direction::Down => assert!(frame.trend >= frame.close),
            }
        }
    }
}
