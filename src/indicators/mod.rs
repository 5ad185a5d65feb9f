// Technical indicator math
pub mod atr;
pub mod supertrend;

pub use atr::calculate_atr_series;
pub use supertrend::calculate_supertrend;
