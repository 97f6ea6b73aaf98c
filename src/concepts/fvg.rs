//! Fair Value Gap detection and lifecycle tracing.
//!
//! A bullish FVG is a 3-candle pattern where `low[i] > high[i-2]`; bearish
//! mirrors with `high[i] < low[i-2]`. The lifecycle trace replays each gap
//! forward from its creation bar and records penetration depth, status
//! transitions, and the inversion bar if price closes through the zone.

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
pub enum FvgStatus {
    Fresh,
    Tested,
    PartiallyFilled,
    FullyFilled,
    Mitigated,
    Inverted,
}

impl FvgStatus {
    /// Statuses under which a gap still acts as a live zone.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            FvgStatus::Fresh | FvgStatus::Tested | FvgStatus::PartiallyFilled
        )
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FvgStatus::Mitigated | FvgStatus::Inverted)
    }
}

/// How zone mitigation is recognized while tracing the lifecycle.
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
pub enum MitigationMode {
    #[default]
    Close,
    Wick,
    Ce,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fvg {
    pub direction: Direction,
    pub top: Price,
    pub bottom: Price,
    pub midpoint: Price,
    /// Index of the first candle of the 3-candle pattern.
    pub start_index: usize,
    /// Index of the third candle; the gap is confirmable here.
    pub creation_index: usize,
    pub status: FvgStatus,
}

/// Deterministic trace of one FVG from its creation bar forward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FvgLifecycle {
    /// Row index into the detected FVG table.
    pub fvg_idx: usize,
    pub direction: Direction,
    pub top: Price,
    pub bottom: Price,
    pub midpoint: Price,
    pub start_index: usize,
    pub creation_index: usize,
    /// Bar where the gap ended (inversion, fill, or age expiry).
    pub end_index: usize,
    pub status: FvgStatus,
    /// Deepest penetration into the zone, if price ever entered it.
    pub fill_level: Option<Price>,
    /// Bar where the gap inverted into an IFVG, if it did.
    pub inversion_index: Option<usize>,
}

/// Detect FVGs, optionally joining consecutive same-direction overlaps.
pub fn detect_fvgs(candles: &[Candle], min_gap_pct: f64, join_consecutive: bool) -> Vec<Fvg> {
    let mut fvgs = Vec::new();

    for i in 2..candles.len() {
        let close = candles[i].close.0;

        // Bullish: low of candle 3 above high of candle 1.
        if candles[i].low.0 > candles[i - 2].high.0 {
            let top = candles[i].low.0;
            let bottom = candles[i - 2].high.0;
            if top - bottom > min_gap_pct * close {
                fvgs.push(Fvg {
                    direction: Direction::Bullish,
                    top: Price(top),
                    bottom: Price(bottom),
                    midpoint: Price((top + bottom) / 2.0),
                    start_index: i - 2,
                    creation_index: i,
                    status: FvgStatus::Fresh,
                });
            }
        }

        // Bearish: high of candle 3 below low of candle 1.
        if candles[i].high.0 < candles[i - 2].low.0 {
            let top = candles[i - 2].low.0;
            let bottom = candles[i].high.0;
            if top - bottom > min_gap_pct * close {
                fvgs.push(Fvg {
                    direction: Direction::Bearish,
                    top: Price(top),
                    bottom: Price(bottom),
                    midpoint: Price((top + bottom) / 2.0),
                    start_index: i - 2,
                    creation_index: i,
                    status: FvgStatus::Fresh,
                });
            }
        }
    }

    if join_consecutive && fvgs.len() > 1 {
        join_consecutive_fvgs(fvgs)
    } else {
        fvgs
    }
}

fn zones_overlap(bottom_a: f64, top_a: f64, bottom_b: f64, top_b: f64) -> bool {
    bottom_a <= top_b && bottom_b <= top_a
}

fn join_consecutive_fvgs(fvgs: Vec<Fvg>) -> Vec<Fvg> {
    let mut merged: Vec<Fvg> = Vec::with_capacity(fvgs.len());
    let mut iter = fvgs.into_iter();
    let mut current = match iter.next() {
        Some(first) => first,
        None => return merged,
    };

    for next in iter {
        if next.direction == current.direction
            && zones_overlap(current.bottom.0, current.top.0, next.bottom.0, next.top.0)
        {
            current.top = current.top.max(next.top);
            current.bottom = current.bottom.min(next.bottom);
            current.midpoint = Price((current.top.0 + current.bottom.0) / 2.0);
            current.start_index = current.start_index.min(next.start_index);
            current.creation_index = next.creation_index;
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    merged
}

/// Replay each gap forward up to `max_age_bars` and record its trace.
pub fn track_lifecycle(
    candles: &[Candle],
    fvgs: &[Fvg],
    mitigation_mode: MitigationMode,
    max_age_bars: usize,
) -> Vec<FvgLifecycle> {
    if fvgs.is_empty() || candles.is_empty() {
        return Vec::new();
    }

    let last = candles.len() - 1;
    let mut traces = Vec::with_capacity(fvgs.len());

    for (fvg_idx, fvg) in fvgs.iter().enumerate() {
        let creation = fvg.creation_index;
        if creation > last {
            continue;
        }

        let mut status = FvgStatus::Fresh;
        let mut fill_level: Option<Price> = None;
        let mut end_index = (creation + max_age_bars).min(last);
        let mut inversion_index: Option<usize> = None;

        for pos in creation + 1..=(creation + max_age_bars).min(last) {
            let bar = &candles[pos];

            match fvg.direction {
                Direction::Bullish => {
                    if bar.low.0 > fvg.top.0 {
                        continue;
                    }
                    if fill_level.map_or(true, |f| bar.low.0 < f.0) {
                        fill_level = Some(bar.low);
                    }

                    if mitigation_mode == MitigationMode::Close && bar.close.0 < fvg.bottom.0 {
                        status = FvgStatus::Inverted;
                        end_index = pos;
                        inversion_index = Some(pos);
                        break;
                    }
                    if mitigation_mode == MitigationMode::Wick && bar.low.0 < fvg.bottom.0 {
                        status = FvgStatus::FullyFilled;
                        end_index = pos;
                        break;
                    }

                    if bar.low.0 <= fvg.midpoint.0 {
                        if matches!(status, FvgStatus::Fresh | FvgStatus::Tested) {
                            status = FvgStatus::PartiallyFilled;
                        }
                    } else if status == FvgStatus::Fresh {
                        status = FvgStatus::Tested;
                    }
                }
                Direction::Bearish => {
                    if bar.high.0 < fvg.bottom.0 {
                        continue;
                    }
                    if fill_level.map_or(true, |f| bar.high.0 > f.0) {
                        fill_level = Some(bar.high);
                    }

                    if mitigation_mode == MitigationMode::Close && bar.close.0 > fvg.top.0 {
                        status = FvgStatus::Inverted;
                        end_index = pos;
                        inversion_index = Some(pos);
                        break;
                    }
                    if mitigation_mode == MitigationMode::Wick && bar.high.0 > fvg.top.0 {
                        status = FvgStatus::FullyFilled;
                        end_index = pos;
                        break;
                    }

                    if bar.high.0 >= fvg.midpoint.0 {
                        if matches!(status, FvgStatus::Fresh | FvgStatus::Tested) {
                            status = FvgStatus::PartiallyFilled;
                        }
                    } else if status == FvgStatus::Fresh {
                        status = FvgStatus::Tested;
                    }
                }
            }
        }

        traces.push(FvgLifecycle {
            fvg_idx,
            direction: fvg.direction,
            top: fvg.top,
            bottom: fvg.bottom,
            midpoint: fvg.midpoint,
            start_index: fvg.start_index,
            creation_index: creation,
            end_index,
            status,
            fill_level,
            inversion_index,
        });
    }

    traces
}
