//! Add-on entries along an open position's path to target.
//!
//! A local same-direction POI between price and target can host an add-on
//! when the bar touches its zone and a structure break in the trade
//! direction happened within the last ten bars. Add-ons trade half size
//! and inherit the parent's stop and target.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde_json::json;

use crate::{
    concepts::{
        poi::{Poi, PoiStatus},
        structure::StructureEvent,
    },
    context::machine::{PoiPhase, PoiStateRecord},
    data::{candle::Candle, domain::Direction},
    strategy::{Signal, SignalKind},
};

const ADDON_SIZE_MULTIPLIER: f64 = 0.5;
const STRUCTURE_RECENCY_BARS: usize = 10;

/// Local POIs whose midpoint sits between current price and the target,
/// same direction and not mitigated, nearest to price first.
pub fn find_addon_candidates<'a>(
    direction: Direction,
    current_price: f64,
    target: f64,
    local_pois: &[&'a Poi],
) -> Vec<&'a Poi> {
    let mut candidates: Vec<&Poi> = local_pois
        .iter()
        .copied()
        .filter(|p| p.direction == direction && p.status != PoiStatus::Mitigated)
        .filter(|p| match direction {
            Direction::Bullish => p.midpoint.0 > current_price && p.midpoint.0 < target,
            Direction::Bearish => p.midpoint.0 < current_price && p.midpoint.0 > target,
        })
        .collect();

    match direction {
        Direction::Bullish => candidates.sort_by_key(|p| OrderedFloat(p.midpoint.0)),
        Direction::Bearish => {
            candidates.sort_by_key(|p| std::cmp::Reverse(OrderedFloat(p.midpoint.0)))
        }
    }
    candidates
}

/// Evaluate one candidate: zone touched this bar plus a recent structure
/// break in the trade direction.
pub fn evaluate_addon(
    main_state: &PoiStateRecord,
    candidate: &Poi,
    candle: &Candle,
    bar_index: usize,
    timestamp: DateTime<Utc>,
    structure: &[StructureEvent],
) -> Option<Signal> {
    if !matches!(
        main_state.phase,
        PoiPhase::Positioned | PoiPhase::Managing
    ) {
        return None;
    }
    let direction = main_state.poi.direction;

    let touches = match direction {
        Direction::Bullish => candle.low.0 <= candidate.top.0,
        Direction::Bearish => candle.high.0 >= candidate.bottom.0,
    };
    if !touches {
        return None;
    }

    let recent_floor = bar_index.saturating_sub(STRUCTURE_RECENCY_BARS);
    let has_recent_structure = structure.iter().any(|e| {
        e.direction == direction
            && e.broken_index <= bar_index
            && e.broken_index >= recent_floor
    });
    if !has_recent_structure {
        return None;
    }

    let mut signal = Signal::new(
        SignalKind::AddOn,
        main_state.poi_id.clone(),
        direction,
        timestamp,
        candle.close.0,
    )
    .with_stop_loss(main_state.stop_loss.unwrap_or(0.0))
    .with_target(main_state.target.unwrap_or(0.0))
    .with_size_multiplier(ADDON_SIZE_MULTIPLIER)
    .with_reason(format!("add-on at {:.1}", candidate.midpoint.0));

    signal.metadata.insert("bar_index".into(), json!(bar_index));
    signal
        .metadata
        .insert("addon_poi_top".into(), json!(candidate.top.0));
    signal
        .metadata
        .insert("addon_poi_bottom".into(), json!(candidate.bottom.0));
    Some(signal)
}
