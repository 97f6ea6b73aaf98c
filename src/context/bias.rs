//! Directional bias from recent structure events.
//!
//! BOS events weigh 2 (reversal information), cBOS 1 (continuation). A side
//! needs more than 60% of the total weight to claim the bias.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    concepts::structure::{StructureEvent, StructureKind},
    data::{candle::Candle, domain::Direction},
};

const BIAS_RATIO_THRESHOLD: f64 = 0.6;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Bullish,
    Bearish,
    #[default]
    Undefined,
}

/// Weighted vote over the most recent `lookback` structure events.
pub fn determine_bias(events: &[StructureEvent], lookback: usize) -> Bias {
    if events.is_empty() {
        return Bias::Undefined;
    }

    let start = events.len().saturating_sub(lookback);
    let mut bullish = 0.0;
    let mut bearish = 0.0;

    for event in &events[start..] {
        let weight = match event.kind {
            StructureKind::Bos => 2.0,
            StructureKind::Cbos => 1.0,
        };
        match event.direction {
            Direction::Bullish => bullish += weight,
            Direction::Bearish => bearish += weight,
        }
    }

    let total = bullish + bearish;
    if total == 0.0 {
        return Bias::Undefined;
    }
    if bullish / total > BIAS_RATIO_THRESHOLD {
        Bias::Bullish
    } else if bearish / total > BIAS_RATIO_THRESHOLD {
        Bias::Bearish
    } else {
        Bias::Undefined
    }
}

/// Time-filtered variant: only events whose break bar closed at or before
/// `ts` participate. `candles` maps break indices to bar times.
pub fn determine_bias_at(
    candles: &[Candle],
    events: &[StructureEvent],
    ts: DateTime<Utc>,
    lookback: usize,
) -> Bias {
    if events.is_empty() {
        return Bias::Undefined;
    }

    // Break indices are emitted in bar order, so the event times are
    // monotone and a prefix scan suffices.
    let visible = events.partition_point(|e| {
        candles
            .get(e.broken_index)
            .map(|bar| bar.time <= ts)
            .unwrap_or(false)
    });

    determine_bias(&events[..visible], lookback)
}
