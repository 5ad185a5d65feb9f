use std::time::Duration;

use crate::Result;

/// Immutable API credentials, owned by the exchange client
///
/// Passed explicitly at construction - no module-level state.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

/// Full configuration for one controller instance
///
/// The exchange and the market-data source may spell the same instrument
/// differently (`BTCUSD` vs `BTC/USDT:USDT`), hence the two symbol fields.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub credentials: Credentials,
    /// Exchange-native symbol, used for product resolution
    pub api_symbol: String,
    /// Market-data-native symbol, used for candle fetches
    pub data_symbol: String,
    pub timeframe: String,
    pub order_size: f64,
    pub leverage: u32,
    /// Candle window fetched each cycle
    pub candle_limit: usize,
    pub poll_interval: Duration,
    /// Settle delay between the close and open legs of a reversal
    pub reversal_delay: Duration,
    /// When set, a rejected or failed order leaves position tracking untouched
    /// instead of advancing it like the permissive default does
    pub strict: bool,
}

impl BotConfig {
    /// Build a config from environment variables (`.env` supported via dotenvy)
    ///
    /// Required: TRENDBOT_API_KEY, TRENDBOT_API_SECRET. Everything else has
    /// the defaults below.
    pub fn from_env() -> Result<Self> {
        let api_key = require_env("TRENDBOT_API_KEY")?;
        let api_secret = require_env("TRENDBOT_API_SECRET")?;
        let base_url = env_or("TRENDBOT_BASE_URL", "https://cdn-ind.testnet.deltaex.org");

        Ok(Self {
            credentials: Credentials {
                api_key,
                api_secret,
                base_url,
            },
            api_symbol: env_or("TRENDBOT_API_SYMBOL", "BTCUSD"),
            data_symbol: env_or("TRENDBOT_DATA_SYMBOL", "BTCUSD"),
            timeframe: env_or("TRENDBOT_TIMEFRAME", "15m"),
            order_size: parse_env("TRENDBOT_ORDER_SIZE", 4.0)?,
            leverage: parse_env("TRENDBOT_LEVERAGE", 10)?,
            candle_limit: parse_env("TRENDBOT_CANDLE_LIMIT", 100)?,
            poll_interval: Duration::from_secs(parse_env("TRENDBOT_POLL_INTERVAL_SECS", 10)?),
            reversal_delay: Duration::from_secs(parse_env("TRENDBOT_REVERSAL_DELAY_SECS", 2)?),
            strict: std::env::var("TRENDBOT_STRICT")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| format!("{} not found in environment", key).into())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("Invalid value for {}: {}", key, raw).into()),
        Err(_) => Ok(default),
    }
}
