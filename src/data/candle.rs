use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    data::domain::{Direction, Price},
    error::{DataError, ZonalResult},
};

/// A single OHLC bar with its bucket-open timestamp (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: u64,
}

impl Candle {
    /// Lower edge of the candle body.
    pub fn body_low(&self) -> Price {
        self.open.min(self.close)
    }

    /// Upper edge of the candle body.
    pub fn body_high(&self) -> Price {
        self.open.max(self.close)
    }

    /// Length of the lower wick: `min(open, close) - low`.
    pub fn lower_wick(&self) -> f64 {
        self.body_low().0 - self.low.0
    }

    /// Length of the upper wick: `high - max(open, close)`.
    pub fn upper_wick(&self) -> f64 {
        self.high.0 - self.body_high().0
    }

    /// Body direction, `None` for a doji (open == close).
    pub fn body_direction(&self) -> Option<Direction> {
        if self.close.0 > self.open.0 {
            Some(Direction::Bullish)
        } else if self.close.0 < self.open.0 {
            Some(Direction::Bearish)
        } else {
            None
        }
    }
}

/// An ordered candle series validated at the boundary.
///
/// Construction enforces the input contract once, so every consumer
/// downstream can rely on `low <= min(open, close)`,
/// `high >= max(open, close)`, and strictly increasing unique timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandleSeries(Vec<Candle>);

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> ZonalResult<Self> {
        for (index, c) in candles.iter().enumerate() {
            if !(c.open.0.is_finite()
                && c.high.0.is_finite()
                && c.low.0.is_finite()
                && c.close.0.is_finite())
            {
                return Err(DataError::MalformedCandle {
                    index,
                    msg: "non-finite OHLC value".to_string(),
                }
                .into());
            }
            if c.low.0 > c.open.0.min(c.close.0) {
                return Err(DataError::MalformedCandle {
                    index,
                    msg: format!("low {} above body low", c.low.0),
                }
                .into());
            }
            if c.high.0 < c.open.0.max(c.close.0) {
                return Err(DataError::MalformedCandle {
                    index,
                    msg: format!("high {} below body high", c.high.0),
                }
                .into());
            }
        }

        for index in 1..candles.len() {
            if candles[index].time == candles[index - 1].time {
                return Err(DataError::DuplicateTimestamp { index }.into());
            }
            if candles[index].time < candles[index - 1].time {
                return Err(DataError::NonMonotonicTimestamp { index }.into());
            }
        }

        Ok(Self(candles))
    }

    /// Internal constructor for series whose ordering is guaranteed by
    /// construction (resampler output, date filtering).
    pub(crate) fn from_raw(candles: Vec<Candle>) -> Self {
        Self(candles)
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.0.get(index)
    }

    pub fn first(&self) -> Option<&Candle> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.0.iter()
    }

    /// Bars whose timestamp falls inside `[start, end]`, order preserved.
    pub fn filter_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::from_raw(
            self.0
                .iter()
                .filter(|c| c.time >= start && c.time <= end)
                .copied()
                .collect(),
        )
    }

    /// Index of the latest bar with `time <= ts`, if any.
    pub fn index_at(&self, ts: DateTime<Utc>) -> Option<usize> {
        let upto = self.0.partition_point(|c| c.time <= ts);
        upto.checked_sub(1)
    }
}

impl std::ops::Index<usize> for CandleSeries {
    type Output = Candle;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}
