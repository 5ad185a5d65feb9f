use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candlestick data for one time bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trend direction reported by the indicator for a single candle
///
/// Mirrors the +1/-1 convention of Supertrend-style overlays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Candle enriched with the computed trend line and direction
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub trend: f64,
    pub direction: Direction,
}

/// Trade action derived from two consecutive directions
///
/// "No signal" is `Option::None` at the call sites; a `Signal` always
/// corresponds to an actionable flip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
}

impl Signal {
    /// Exchange-native order side string
    pub fn side(&self) -> Side {
        match self {
            Signal::Buy => Side::Buy,
            Signal::Sell => Side::Sell,
        }
    }
}

/// Order side as transmitted to the exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Directional position held by a controller instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}

impl From<Signal> for PositionSide {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Buy => PositionSide::Long,
            Signal::Sell => PositionSide::Short,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Flat => write!(f, "flat"),
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Severity tag carried on every log event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Structured log event delivered to the operator stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

impl LogEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_to_position() {
        assert_eq!(PositionSide::from(Signal::Buy), PositionSide::Long);
        assert_eq!(PositionSide::from(Signal::Sell), PositionSide::Short);
    }

    #[test]
    fn test_side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"buy\"");
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"sell\"");
    }
}
