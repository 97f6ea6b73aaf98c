//! POI builder: aggregate concept artifacts into scored composite zones.
//!
//! Every live artifact normalizes into a zone candidate; candidates of one
//! direction merge when they overlap (within tolerance), and the merged
//! zone is scored by component base value, freshness, and confluence.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    concepts::{
        breakers::{Breaker, BreakerStatus},
        fvg::{Fvg, FvgLifecycle, FvgStatus},
        liquidity::{LiquidityLevel, LiquidityStatus, SessionLevel},
        orderblocks::{ObStatus, OrderBlock},
    },
    data::{
        candle::Candle,
        domain::{Direction, Price, Timeframe},
    },
};

/// Liquidity levels become thin bands of ±0.05% around the level.
const LIQUIDITY_BAND_PCT: f64 = 0.0005;
/// Session extremes become thin bands of ±0.03%.
const SESSION_BAND_PCT: f64 = 0.0003;
/// Liquidity clusters need this many touches to score.
const LIQUIDITY_MIN_SCORED_TOUCHES: usize = 3;

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
pub enum PoiStatus {
    Active,
    Tested,
    Mitigated,
}

/// Source artifact type of a POI component.
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
#[strum(serialize_all = "snake_case")]
pub enum ComponentKind {
    FvgHtf,
    FvgLtf,
    Ob,
    Breaker,
    Ifvg,
    Liquidity,
    Session,
}

impl ComponentKind {
    pub fn base_score(&self) -> f64 {
        match self {
            ComponentKind::FvgHtf => 3.0,
            ComponentKind::FvgLtf => 1.0,
            ComponentKind::Ob => 2.0,
            ComponentKind::Breaker => 2.0,
            ComponentKind::Ifvg => 2.0,
            ComponentKind::Liquidity => 2.0,
            ComponentKind::Session => 1.0,
        }
    }
}

/// Freshness of the source artifact at build time.
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
pub enum Freshness {
    Fresh,
    Tested,
    PartiallyFilled,
}

impl Freshness {
    pub fn multiplier(&self) -> f64 {
        match self {
            Freshness::Fresh => 1.5,
            Freshness::Tested => 1.0,
            Freshness::PartiallyFilled => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoiComponent {
    pub kind: ComponentKind,
    pub source_index: usize,
    pub freshness: Freshness,
}

/// A composite zone aggregating overlapping same-direction artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub direction: Direction,
    pub top: Price,
    pub bottom: Price,
    pub midpoint: Price,
    pub score: f64,
    pub components: SmallVec<[PoiComponent; 4]>,
    pub status: PoiStatus,
    /// Latest creation time of any FVG-type component, or the first bar
    /// time when none contribute; the zone is invisible before this.
    pub creation_time: DateTime<Utc>,
}

impl Poi {
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn is_tradeable(&self) -> bool {
        !matches!(self.status, PoiStatus::Mitigated)
    }
}

/// All artifact tables of one timeframe feeding the builder.
#[derive(Debug, Clone, Copy)]
pub struct PoiInputs<'a> {
    pub fvgs: &'a [Fvg],
    pub fvg_lifecycle: &'a [FvgLifecycle],
    pub orderblocks: &'a [OrderBlock],
    pub breakers: &'a [Breaker],
    pub liquidity: &'a [LiquidityLevel],
    pub session_levels: &'a [SessionLevel],
}

#[derive(Debug, Clone, Copy)]
struct ZoneCandidate {
    direction: Direction,
    top: f64,
    bottom: f64,
    kind: ComponentKind,
    source_index: usize,
    freshness: Freshness,
}

/// Build the POI table for one timeframe, sorted by score descending.
pub fn build_pois(
    candles: &[Candle],
    inputs: &PoiInputs<'_>,
    overlap_tolerance: f64,
    timeframe: Timeframe,
) -> Vec<Poi> {
    if candles.is_empty() {
        return Vec::new();
    }

    let zones = normalize_all(inputs, timeframe);
    if zones.is_empty() {
        return Vec::new();
    }

    let first_bar_time = candles[0].time;
    let mut built: Vec<Poi> = Vec::new();

    for direction in [Direction::Bullish, Direction::Bearish] {
        let partition: Vec<ZoneCandidate> = zones
            .iter()
            .copied()
            .filter(|z| z.direction == direction)
            .collect();

        for (top, bottom, components) in merge_zones(partition, overlap_tolerance) {
            let creation_time =
                creation_time_of(&components, inputs.fvgs, candles, first_bar_time);
            built.push(Poi {
                direction,
                top: Price(top),
                bottom: Price(bottom),
                midpoint: Price((top + bottom) / 2.0),
                score: score_components(&components),
                components,
                status: PoiStatus::Active,
                creation_time,
            });
        }
    }

    built.sort_by_key(|poi| std::cmp::Reverse(OrderedFloat(poi.score)));
    built
}

fn normalize_all(inputs: &PoiInputs<'_>, timeframe: Timeframe) -> Vec<ZoneCandidate> {
    let mut zones = Vec::new();
    let is_htf = matches!(timeframe, Timeframe::H1 | Timeframe::H4);
    let fvg_kind = if is_htf {
        ComponentKind::FvgHtf
    } else {
        ComponentKind::FvgLtf
    };

    // FVGs, with their lifecycle trace overriding the detection status.
    for (i, fvg) in inputs.fvgs.iter().enumerate() {
        let lifecycle = inputs.fvg_lifecycle.iter().find(|lc| lc.fvg_idx == i);
        let status = lifecycle.map(|lc| lc.status).unwrap_or(fvg.status);

        if status == FvgStatus::Inverted {
            zones.push(ZoneCandidate {
                direction: fvg.direction.flipped(),
                top: fvg.top.0,
                bottom: fvg.bottom.0,
                kind: ComponentKind::Ifvg,
                source_index: i,
                freshness: Freshness::Fresh,
            });
            continue;
        }
        let freshness = match status {
            FvgStatus::Fresh => Freshness::Fresh,
            FvgStatus::Tested => Freshness::Tested,
            FvgStatus::PartiallyFilled => Freshness::PartiallyFilled,
            FvgStatus::Mitigated | FvgStatus::FullyFilled | FvgStatus::Inverted => continue,
        };
        zones.push(ZoneCandidate {
            direction: fvg.direction,
            top: fvg.top.0,
            bottom: fvg.bottom.0,
            kind: fvg_kind,
            source_index: i,
            freshness,
        });
    }

    // Order blocks.
    for (i, ob) in inputs.orderblocks.iter().enumerate() {
        let freshness = match ob.status {
            ObStatus::Active => Freshness::Fresh,
            ObStatus::Tested => Freshness::Tested,
            ObStatus::Mitigated | ObStatus::Broken => continue,
        };
        zones.push(ZoneCandidate {
            direction: ob.direction,
            top: ob.top.0,
            bottom: ob.bottom.0,
            kind: ComponentKind::Ob,
            source_index: i,
            freshness,
        });
    }

    // Breaker blocks.
    for (i, breaker) in inputs.breakers.iter().enumerate() {
        let freshness = match breaker.status {
            BreakerStatus::Active => Freshness::Fresh,
            BreakerStatus::Tested => Freshness::Tested,
            BreakerStatus::Mitigated => continue,
        };
        zones.push(ZoneCandidate {
            direction: breaker.direction,
            top: breaker.top.0,
            bottom: breaker.bottom.0,
            kind: ComponentKind::Breaker,
            source_index: i,
            freshness,
        });
    }

    // Liquidity levels with enough touches become thin bands.
    for (i, level) in inputs.liquidity.iter().enumerate() {
        if level.status == LiquidityStatus::Swept {
            continue;
        }
        if level.count < LIQUIDITY_MIN_SCORED_TOUCHES {
            continue;
        }
        let half = level.level.0 * LIQUIDITY_BAND_PCT;
        zones.push(ZoneCandidate {
            direction: level.direction,
            top: level.level.0 + half,
            bottom: level.level.0 - half,
            kind: ComponentKind::Liquidity,
            source_index: i,
            freshness: Freshness::Fresh,
        });
    }

    // Session highs resist (bearish), session lows support (bullish).
    for (i, session) in inputs.session_levels.iter().enumerate() {
        let high_half = session.high.0 * SESSION_BAND_PCT;
        zones.push(ZoneCandidate {
            direction: Direction::Bearish,
            top: session.high.0 + high_half,
            bottom: session.high.0 - high_half,
            kind: ComponentKind::Session,
            source_index: i,
            freshness: Freshness::Fresh,
        });
        let low_half = session.low.0 * SESSION_BAND_PCT;
        zones.push(ZoneCandidate {
            direction: Direction::Bullish,
            top: session.low.0 + low_half,
            bottom: session.low.0 - low_half,
            kind: ComponentKind::Session,
            source_index: i,
            freshness: Freshness::Fresh,
        });
    }

    zones
}

type MergedZone = (f64, f64, SmallVec<[PoiComponent; 4]>);

fn merge_zones(mut zones: Vec<ZoneCandidate>, tolerance: f64) -> Vec<MergedZone> {
    if zones.is_empty() {
        return Vec::new();
    }

    zones.sort_by_key(|z| OrderedFloat(z.bottom));

    let mut merged: Vec<MergedZone> = Vec::new();
    let mut current_top = zones[0].top;
    let mut current_bottom = zones[0].bottom;
    let mut components: SmallVec<[PoiComponent; 4]> = SmallVec::new();
    components.push(component_of(&zones[0]));

    for zone in &zones[1..] {
        let tol = current_top * tolerance;
        if zone.bottom <= current_top + tol {
            current_top = current_top.max(zone.top);
            current_bottom = current_bottom.min(zone.bottom);
            components.push(component_of(zone));
        } else {
            merged.push((current_top, current_bottom, std::mem::take(&mut components)));
            current_top = zone.top;
            current_bottom = zone.bottom;
            components.push(component_of(zone));
        }
    }
    merged.push((current_top, current_bottom, components));

    merged
}

fn component_of(zone: &ZoneCandidate) -> PoiComponent {
    PoiComponent {
        kind: zone.kind,
        source_index: zone.source_index,
        freshness: zone.freshness,
    }
}

/// Base score by component type, times a freshness multiplier, plus a
/// confluence bonus: +2 for two components, +4 for three or more.
fn score_components(components: &[PoiComponent]) -> f64 {
    let mut total = 0.0;
    for comp in components {
        total += comp.kind.base_score() * comp.freshness.multiplier();
    }
    match components.len() {
        0 | 1 => {}
        2 => total += 2.0,
        _ => total += 4.0,
    }
    (total * 100.0).round() / 100.0
}

fn creation_time_of(
    components: &[PoiComponent],
    fvgs: &[Fvg],
    candles: &[Candle],
    first_bar_time: DateTime<Utc>,
) -> DateTime<Utc> {
    let mut max_time = first_bar_time;
    for comp in components {
        if matches!(
            comp.kind,
            ComponentKind::FvgHtf | ComponentKind::FvgLtf | ComponentKind::Ifvg
        ) {
            if let Some(fvg) = fvgs.get(comp.source_index) {
                if let Some(bar) = candles.get(fvg.creation_index) {
                    if bar.time > max_time {
                        max_time = bar.time;
                    }
                }
            }
        }
    }
    max_time
}
