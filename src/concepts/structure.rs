//! Market structure detection: BOS and cBOS.
//!
//! BOS breaks a swing level against the running trend (reversal); cBOS
//! breaks one in the trend direction (continuation). The running trend is
//! derived state inside the fold, not a stored entity.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    concepts::swings::SwingPoint,
    data::{
        candle::Candle,
        domain::{Direction, Price},
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
#[strum(serialize_all = "UPPERCASE")]
pub enum StructureKind {
    Bos,
    Cbos,
}

/// How a break is recognized: on the candle close or on the wick.
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
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BreakMode {
    #[default]
    Close,
    Wick,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureEvent {
    pub kind: StructureKind,
    pub direction: Direction,
    pub broken_level: Price,
    /// Bar index at which the break occurred; the event is confirmable here.
    pub broken_index: usize,
    /// Bar index of the swing whose level was broken.
    pub swing_index: usize,
}

/// Fold over the bars, registering swings as they confirm and emitting a
/// break event when price crosses the most recent unbroken swing level.
pub fn detect_structure(
    candles: &[Candle],
    swing_points: &[SwingPoint],
    swing_length: usize,
    break_mode: BreakMode,
) -> Vec<StructureEvent> {
    if swing_points.len() < 2 {
        return Vec::new();
    }

    let mut events = Vec::new();
    let mut trend: Option<Direction> = None;

    // Most recent confirmed, unbroken swing on each side: (index, level).
    let mut last_swing_high: Option<(usize, Price)> = None;
    let mut last_swing_low: Option<(usize, Price)> = None;

    let mut pending = swing_points.iter().peekable();

    for (i, bar) in candles.iter().enumerate() {
        // Register swings confirmed at this bar.
        while let Some(point) = pending.peek() {
            if point.confirmed_at(swing_length) > i {
                break;
            }
            match point.direction {
                Direction::Bullish => last_swing_high = Some((point.index, point.level)),
                Direction::Bearish => last_swing_low = Some((point.index, point.level)),
            }
            pending.next();
        }

        let (break_up, break_down) = match break_mode {
            BreakMode::Close => (bar.close.0, bar.close.0),
            BreakMode::Wick => (bar.high.0, bar.low.0),
        };

        if let Some((swing_index, level)) = last_swing_high {
            if break_up > level.0 {
                let kind = match trend {
                    Some(Direction::Bearish) => StructureKind::Bos,
                    _ => StructureKind::Cbos,
                };
                events.push(StructureEvent {
                    kind,
                    direction: Direction::Bullish,
                    broken_level: level,
                    broken_index: i,
                    swing_index,
                });
                trend = Some(Direction::Bullish);
                last_swing_high = None;
            }
        }

        if let Some((swing_index, level)) = last_swing_low {
            if break_down < level.0 {
                let kind = match trend {
                    Some(Direction::Bullish) => StructureKind::Bos,
                    _ => StructureKind::Cbos,
                };
                events.push(StructureEvent {
                    kind,
                    direction: Direction::Bearish,
                    broken_level: level,
                    broken_index: i,
                    swing_index,
                });
                trend = Some(Direction::Bearish);
                last_swing_low = None;
            }
        }
    }

    events
}
