//! First Trouble Area handling.
//!
//! The FTA is the nearest opposing POI sitting between current price and
//! the target. A close FTA vetoes the entry; a far one does not.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    concepts::poi::Poi,
    data::domain::{Direction, Timeframe},
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
#[strum(serialize_all = "lowercase")]
pub enum FtaDistance {
    Close,
    Far,
}

/// Snapshot of the blocking zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fta {
    pub direction: Direction,
    pub top: f64,
    pub bottom: f64,
    pub midpoint: f64,
    pub score: f64,
}

/// Find the opposing POI closest to current price on the path to the
/// target. Long: bearish POIs with `bottom > price` and `top < target`,
/// lowest bottom first. Short mirrors.
pub fn detect_fta(
    current_price: f64,
    target: f64,
    direction: Direction,
    active_pois: &[(Timeframe, &Poi)],
) -> Option<Fta> {
    let mut best: Option<&Poi> = None;

    for (_, poi) in active_pois {
        if !poi.is_tradeable() {
            continue;
        }
        match direction {
            Direction::Bullish => {
                if poi.direction != Direction::Bearish {
                    continue;
                }
                if poi.bottom.0 > current_price && poi.top.0 < target {
                    let closer = best.map_or(true, |b| poi.bottom.0 < b.bottom.0);
                    if closer {
                        best = Some(poi);
                    }
                }
            }
            Direction::Bearish => {
                if poi.direction != Direction::Bullish {
                    continue;
                }
                if poi.top.0 < current_price && poi.bottom.0 > target {
                    let closer = best.map_or(true, |b| poi.top.0 > b.top.0);
                    if closer {
                        best = Some(poi);
                    }
                }
            }
        }
    }

    best.map(|poi| Fta {
        direction: poi.direction,
        top: poi.top.0,
        bottom: poi.bottom.0,
        midpoint: poi.midpoint.0,
        score: poi.score,
    })
}

/// Offset of the FTA midpoint as a fraction of the price-to-target range.
/// The boundary is `<=`: exactly at the threshold classifies as close, so
/// a zero threshold with any positive offset classifies as far.
pub fn classify_distance(
    fta: &Fta,
    current_price: f64,
    target: f64,
    close_threshold_pct: f64,
) -> FtaDistance {
    let total_range = (target - current_price).abs();
    if total_range == 0.0 {
        return FtaDistance::Close;
    }

    let offset = (fta.midpoint - current_price).abs();
    if offset / total_range <= close_threshold_pct {
        FtaDistance::Close
    } else {
        FtaDistance::Far
    }
}

/// The FTA is invalidated once price closes through its far side in the
/// trade direction.
pub fn is_invalidated(fta: &Fta, candle_close: f64, direction: Direction) -> bool {
    match direction {
        Direction::Bullish => candle_close > fta.top,
        Direction::Bearish => candle_close < fta.bottom,
    }
}

/// The FTA validated: a wick reached the zone and the close rejected it.
pub fn is_validated(
    fta: &Fta,
    candle_high: f64,
    candle_low: f64,
    candle_close: f64,
    direction: Direction,
) -> bool {
    match direction {
        Direction::Bullish => candle_high >= fta.bottom && candle_close < fta.bottom,
        Direction::Bearish => candle_low <= fta.top && candle_close > fta.top,
    }
}

/// Entry gate: no FTA or a far one permits entry; a close one blocks it.
pub fn permits_entry(classification: Option<FtaDistance>) -> bool {
    !matches!(classification, Some(FtaDistance::Close))
}
