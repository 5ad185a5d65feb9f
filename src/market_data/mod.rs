//! Candle retrieval
//!
//! Fetches a fixed-size recent OHLCV window from the exchange's public
//! history endpoint. Failures surface as `Err` and the controller treats
//! them as "skip this cycle" - nothing here may take down the polling loop.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::Candle;
use crate::Result;

/// Client for the public candle-history endpoint
#[derive(Clone)]
pub struct CandleClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    result: Vec<RawCandle>,
}

#[derive(Debug, Deserialize)]
struct RawCandle {
    /// Bucket open time, Unix seconds
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl CandleClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Fetch the most recent `limit` candles for a symbol and timeframe
    ///
    /// Returned oldest-first and strictly time-ordered. An empty result is
    /// possible (new listing, market halt) and is the caller's skip case.
    pub async fn fetch_window(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let bucket = timeframe_duration(timeframe)?;
        let end = Utc::now().timestamp();
        let start = end - (bucket.as_secs() as i64) * (limit as i64 + 1);

        let url = format!(
            "{}/v2/history/candles?resolution={}&symbol={}&start={}&end={}",
            self.base_url, timeframe, symbol, start, end
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(format!("Candle fetch failed: HTTP {}", response.status()).into());
        }

        let parsed: CandlesResponse = response.json().await?;

        let mut candles: Vec<Candle> = parsed
            .result
            .into_iter()
            .filter_map(|raw| {
                Some(Candle {
                    timestamp: parse_timestamp(raw.time)?,
                    open: raw.open,
                    high: raw.high,
                    low: raw.low,
                    close: raw.close,
                    volume: raw.volume,
                })
            })
            .collect();

        // The endpoint returns newest-first; callers need oldest-first
        candles.sort_by_key(|c| c.timestamp);
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }

        Ok(candles)
    }
}

fn parse_timestamp(unix_secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(unix_secs, 0).single()
}

/// Validate that a candle window is strictly ordered and uniformly spaced
///
/// Allows up to 1.5x the expected interval to absorb bucket-boundary jitter;
/// anything wider means the feed has holes and the cycle should be skipped.
pub fn validate_candle_spacing(
    candles: &[Candle],
    expected_interval: std::time::Duration,
) -> anyhow::Result<()> {
    let expected_secs = expected_interval.as_secs() as i64;
    let max_gap_secs = expected_secs + expected_secs / 2;

    for pair in candles.windows(2) {
        let gap = (pair[1].timestamp - pair[0].timestamp).num_seconds();
        if gap <= 0 {
            anyhow::bail!("candles out of order at {}", pair[1].timestamp);
        }
        if gap > max_gap_secs {
            anyhow::bail!(
                "gap of {}s between {} and {} (expected ~{}s)",
                gap,
                pair[0].timestamp,
                pair[1].timestamp,
                expected_secs
            );
        }
    }

    Ok(())
}

/// Parse a timeframe string ("1m", "15m", "1h", "4h", "1d") into a duration
///
/// Unknown formats are a configuration error, caught at startup.
pub fn timeframe_duration(timeframe: &str) -> Result<Duration> {
    let (digits, unit_secs) = if let Some(digits) = timeframe.strip_suffix('m') {
        (digits, 60)
    } else if let Some(digits) = timeframe.strip_suffix('h') {
        (digits, 3600)
    } else if let Some(digits) = timeframe.strip_suffix('d') {
        (digits, 86400)
    } else {
        return Err(format!("Invalid timeframe unit: {}", timeframe).into());
    };

    let count: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid timeframe: {}", timeframe))?;
    if count == 0 {
        return Err(format!("Invalid timeframe: {}", timeframe).into());
    }

    Ok(Duration::from_secs(count * unit_secs))
}
