//! Swing high/low detection.
//!
//! A swing high at index `i` is the maximum high over the window
//! `[i - swing_length, i + swing_length]` and strictly higher than both
//! immediate neighbours; swing lows mirror. A swing is confirmable only
//! `swing_length` bars after its occurrence.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::data::{
    candle::Candle,
    domain::{Direction, Price},
};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SwingStatus {
    Active,
    Swept,
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    /// Bar index of the extremum in the source series.
    pub index: usize,
    /// `Bullish` marks a swing high, `Bearish` a swing low.
    pub direction: Direction,
    pub level: Price,
    pub status: SwingStatus,
}

impl SwingPoint {
    /// Bar index at which this swing becomes visible to the replay.
    pub fn confirmed_at(&self, swing_length: usize) -> usize {
        self.index + swing_length
    }
}

/// Detect swing points over a symmetric window, ordered by bar index.
pub fn detect_swings(candles: &[Candle], swing_length: usize) -> Vec<SwingPoint> {
    let n = candles.len();
    if swing_length == 0 || n < 2 * swing_length + 1 {
        return Vec::new();
    }

    let mut points = Vec::new();

    for i in swing_length..n - swing_length {
        let window = &candles[i - swing_length..=i + swing_length];
        let high = candles[i].high.0;
        let low = candles[i].low.0;

        let is_window_max = window.iter().all(|c| c.high.0 <= high);
        let is_window_min = window.iter().all(|c| c.low.0 >= low);

        let is_high = is_window_max
            && high > candles[i - 1].high.0
            && high > candles[i + 1].high.0;
        let is_low = is_window_min
            && low < candles[i - 1].low.0
            && low < candles[i + 1].low.0;

        // A bar qualifying on both sides keeps only the high.
        if is_high {
            points.push(SwingPoint {
                index: i,
                direction: Direction::Bullish,
                level: Price(high),
                status: SwingStatus::Active,
            });
        } else if is_low {
            points.push(SwingPoint {
                index: i,
                direction: Direction::Bearish,
                level: Price(low),
                status: SwingStatus::Active,
            });
        }
    }

    points
}

/// Mark active swings as swept once price wicks past their level.
pub fn mark_swept(points: &mut [SwingPoint], bar_high: Price, bar_low: Price) {
    for point in points.iter_mut() {
        if point.status != SwingStatus::Active {
            continue;
        }
        let swept = match point.direction {
            Direction::Bullish => bar_high.0 > point.level.0,
            Direction::Bearish => bar_low.0 < point.level.0,
        };
        if swept {
            point.status = SwingStatus::Swept;
        }
    }
}
