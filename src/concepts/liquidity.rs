//! Liquidity detection: equal highs/lows, session levels, sweeps.
//!
//! Stop-losses cluster at equal highs, equal lows, and session extremes.
//! A sweep wicks past a level while the close stays on the original side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    concepts::swings::SwingPoint,
    data::{
        candle::Candle,
        domain::{Direction, Price, Timeframe},
        resampler::bucket_open,
    },
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
pub enum LiquidityStatus {
    Active,
    Swept,
}

/// A cluster of near-equal swing levels where resting liquidity sits.
///
/// Buy-side pools sit above price (`Bullish`, formed from swing highs);
/// sell-side pools sit below (`Bearish`, from swing lows).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLevel {
    pub direction: Direction,
    pub level: Price,
    pub count: usize,
    /// Bar indices of the swings that touch this level.
    pub source_indices: SmallVec<[usize; 4]>,
    pub status: LiquidityStatus,
}

impl LiquidityLevel {
    /// Bar index at which the latest contributing swing confirms; the
    /// level is invisible to the replay before then.
    pub fn confirmed_at(&self, swing_length: usize) -> usize {
        self.source_indices
            .iter()
            .max()
            .map(|idx| idx + swing_length)
            .unwrap_or(0)
    }
}

/// Cluster swing highs and lows into liquidity levels.
pub fn detect_equal_levels(
    swing_points: &[SwingPoint],
    range_percent: f64,
    min_touches: usize,
) -> Vec<LiquidityLevel> {
    let mut levels = Vec::new();

    for direction in [Direction::Bullish, Direction::Bearish] {
        let candidates: Vec<&SwingPoint> = swing_points
            .iter()
            .filter(|p| p.direction == direction)
            .collect();
        cluster_levels(&candidates, direction, range_percent, min_touches, &mut levels);
    }

    levels
}

fn cluster_levels(
    points: &[&SwingPoint],
    direction: Direction,
    range_percent: f64,
    min_touches: usize,
    output: &mut Vec<LiquidityLevel>,
) {
    if points.len() < min_touches {
        return;
    }

    let mut used = vec![false; points.len()];

    for i in 0..points.len() {
        if used[i] {
            continue;
        }
        let anchor = points[i].level.0;
        let threshold = anchor * range_percent;
        let mut cluster_prices = vec![anchor];
        let mut cluster_indices: SmallVec<[usize; 4]> = SmallVec::new();
        cluster_indices.push(points[i].index);
        used[i] = true;

        for j in i + 1..points.len() {
            if used[j] {
                continue;
            }
            if (points[j].level.0 - anchor).abs() <= threshold {
                cluster_prices.push(points[j].level.0);
                cluster_indices.push(points[j].index);
                used[j] = true;
            }
        }

        if cluster_prices.len() >= min_touches {
            let mean = cluster_prices.iter().sum::<f64>() / cluster_prices.len() as f64;
            output.push(LiquidityLevel {
                direction,
                level: Price(mean),
                count: cluster_prices.len(),
                source_indices: cluster_indices,
                status: LiquidityStatus::Active,
            });
        }
    }
}

/// Daily session extremes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionLevel {
    pub period_start: DateTime<Utc>,
    pub high: Price,
    pub low: Price,
}

/// High/low per calendar day (00:00 UTC sessions).
pub fn detect_session_levels(candles: &[Candle]) -> Vec<SessionLevel> {
    let mut levels: Vec<SessionLevel> = Vec::new();

    for bar in candles {
        let day = bucket_open(bar.time, Timeframe::D1);
        match levels.last_mut() {
            Some(session) if session.period_start == day => {
                session.high = session.high.max(bar.high);
                session.low = session.low.min(bar.low);
            }
            _ => levels.push(SessionLevel {
                period_start: day,
                high: bar.high,
                low: bar.low,
            }),
        }
    }

    levels
}

/// A sweep wicks past the level but closes back on the original side.
pub fn is_sweep(
    bar_high: Price,
    bar_low: Price,
    bar_close: Price,
    level: Price,
    direction: Direction,
) -> bool {
    match direction {
        // Buy-side above: wick above the level, close back at or below it.
        Direction::Bullish => bar_high.0 > level.0 && bar_close.0 <= level.0,
        // Sell-side below: wick below the level, close back at or above it.
        Direction::Bearish => bar_low.0 < level.0 && bar_close.0 >= level.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::swings::SwingStatus;
    use chrono::TimeZone;

    fn swing(index: usize, direction: Direction, level: f64) -> SwingPoint {
        SwingPoint {
            index,
            direction,
            level: Price(level),
            status: SwingStatus::Active,
        }
    }

    #[test]
    fn clusters_equal_highs() {
        let points = vec![
            swing(5, Direction::Bullish, 100.0),
            swing(12, Direction::Bullish, 100.05),
            swing(20, Direction::Bullish, 99.98),
            swing(30, Direction::Bullish, 120.0),
        ];
        let levels = detect_equal_levels(&points, 0.001, 2);

        assert_eq!(levels.len(), 1, "three near-equal highs form one pool");
        let level = &levels[0];
        assert_eq!(level.direction, Direction::Bullish);
        assert_eq!(level.count, 3);
        assert_eq!(level.source_indices.as_slice(), &[5, 12, 20]);
        assert!(
            (level.level.0 - 100.01).abs() < 1e-9,
            "level is the cluster mean, got {}",
            level.level.0
        );
    }

    #[test]
    fn respects_min_touches() {
        let points = vec![
            swing(5, Direction::Bearish, 95.0),
            swing(12, Direction::Bearish, 95.02),
        ];
        assert_eq!(detect_equal_levels(&points, 0.001, 3).len(), 0);
        assert_eq!(detect_equal_levels(&points, 0.001, 2).len(), 1);
    }

    #[test]
    fn highs_and_lows_cluster_independently() {
        let points = vec![
            swing(5, Direction::Bullish, 100.0),
            swing(12, Direction::Bullish, 100.02),
            swing(8, Direction::Bearish, 100.01),
            swing(15, Direction::Bearish, 100.03),
        ];
        let levels = detect_equal_levels(&points, 0.001, 2);
        assert_eq!(levels.len(), 2, "one pool per side");
        assert_eq!(levels[0].direction, Direction::Bullish);
        assert_eq!(levels[1].direction, Direction::Bearish);
    }

    #[test]
    fn confirmation_waits_for_latest_swing() {
        let points = vec![
            swing(5, Direction::Bullish, 100.0),
            swing(12, Direction::Bullish, 100.02),
        ];
        let levels = detect_equal_levels(&points, 0.001, 2);
        assert_eq!(levels[0].confirmed_at(5), 17, "latest swing at 12 + length 5");
    }

    #[test]
    fn session_levels_split_at_midnight() {
        let candle = |minute: i64, high: f64, low: f64| Candle {
            time: Utc.timestamp_opt(minute * 60, 0).unwrap(),
            open: Price((high + low) / 2.0),
            high: Price(high),
            low: Price(low),
            close: Price((high + low) / 2.0),
            volume: 1,
        };
        let candles = vec![
            candle(10, 101.0, 99.0),
            candle(600, 104.0, 98.0),
            candle(1440 + 10, 106.0, 103.0),
        ];

        let sessions = detect_session_levels(&candles);
        assert_eq!(sessions.len(), 2, "bars span two calendar days");
        assert_eq!(sessions[0].high, Price(104.0));
        assert_eq!(sessions[0].low, Price(98.0));
        assert_eq!(sessions[1].high, Price(106.0));
    }

    #[test]
    fn sweep_requires_wick_and_rejection() {
        // Sell-side level at 95: wick below, close back above.
        assert!(is_sweep(Price(99.0), Price(94.5), Price(96.0), Price(95.0), Direction::Bearish));
        // Close below the level is a break, not a sweep.
        assert!(!is_sweep(Price(99.0), Price(94.5), Price(94.8), Price(95.0), Direction::Bearish));
        // No wick past the level at all.
        assert!(!is_sweep(Price(99.0), Price(95.5), Price(96.0), Price(95.0), Direction::Bearish));

        // Buy-side level at 105.
        assert!(is_sweep(Price(105.5), Price(101.0), Price(104.0), Price(105.0), Direction::Bullish));
    }
}
