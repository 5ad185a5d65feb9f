// Core modules
pub mod config;
pub mod control;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod logs;
pub mod market_data;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use config::{BotConfig, Credentials};
pub use models::*;
pub use strategy::TrendStrategy;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
