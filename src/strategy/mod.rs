// Trend strategy module
pub mod signals;

use crate::indicators::calculate_supertrend;
use crate::models::{Candle, IndicatorFrame};
use crate::Result;

/// Pluggable trend indicator
///
/// The controller only consumes the frame sequence, so alternative
/// indicators can be substituted without touching it.
pub trait TrendStrategy: Send + Sync {
    /// Compute one frame per candle the indicator can cover
    ///
    /// An empty result means "window too short" and the cycle is skipped;
    /// it is not an error.
    fn compute_frames(&self, candles: &[Candle]) -> Result<Vec<IndicatorFrame>>;

    /// Strategy name for logging
    fn name(&self) -> &str;

    /// Minimum candles required to produce a signal (two frames)
    fn min_candles_required(&self) -> usize;
}

/// Supertrend flip strategy
///
/// ATR-banded trend overlay; a direction flip between the last two candles
/// is the trade trigger.
#[derive(Debug, Clone)]
pub struct SupertrendStrategy {
    pub atr_period: usize,
    pub multiplier: f64,
}

impl SupertrendStrategy {
    pub fn new(atr_period: usize, multiplier: f64) -> Self {
        Self {
            atr_period,
            multiplier,
        }
    }
}

impl Default for SupertrendStrategy {
    fn default() -> Self {
        Self {
            atr_period: 10,
            multiplier: 1.6,
        }
    }
}

impl TrendStrategy for SupertrendStrategy {
    fn compute_frames(&self, candles: &[Candle]) -> Result<Vec<IndicatorFrame>> {
        Ok(calculate_supertrend(candles, self.atr_period, self.multiplier))
    }

    fn name(&self) -> &str {
        "supertrend"
    }

    fn min_candles_required(&self) -> usize {
        // One frame per candle from atr_period on; a signal needs two frames
        self.atr_period + 2
    }
}
