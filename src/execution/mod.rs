// Order submission and the position control loop
pub mod controller;
pub mod executor;

pub use controller::{PositionController, StartupError};
pub use executor::OrderExecutor;
