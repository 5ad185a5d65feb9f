use crate::models::{Direction, IndicatorFrame, Signal};

/// Derive a trade signal from the two most recent trend directions
///
/// Only a flip between consecutive candles is actionable:
///
/// | previous | current | signal |
/// |----------|---------|--------|
/// | Up       | Down    | Sell   |
/// | Down     | Up      | Buy    |
/// | equal    |         | None   |
pub fn signal_from_directions(previous: Direction, current: Direction) -> Option<Signal> {
    match (previous, current) {
        (Direction::Up, Direction::Down) => Some(Signal::Sell),
        (Direction::Down, Direction::Up) => Some(Signal::Buy),
        _ => None,
    }
}

/// Signal for a frame sequence; requires at least two frames
pub fn signal_from_frames(frames: &[IndicatorFrame]) -> Option<Signal> {
    if frames.len() < 2 {
        return None;
    }
    let previous = frames[frames.len() - 2].direction;
    let current = frames[frames.len() - 1].direction;
    signal_from_directions(previous, current)
}
