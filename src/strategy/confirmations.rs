//! Confirmation counting per POI interaction.
//!
//! Eight deterministic checkers run in catalog order against the current
//! bar. Collection rules: no duplicate (kind, bar); FVG_WICK_REACTION is
//! gated on five or more pre-existing confirmations; the list caps at
//! `max_count`; collection returns a new list without mutating the input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    concepts::{
        fvg::{Fvg, FvgLifecycle, FvgStatus},
        liquidity::{LiquidityLevel, LiquidityStatus},
        poi::Poi,
        structure::{StructureEvent, StructureKind},
    },
    config::ConfirmationsConfig,
    data::{candle::Candle, domain::Direction},
};

/// Tolerance around an FVG midpoint for the CVB test.
const CVB_TOLERANCE_PCT: f64 = 0.001;
/// Pre-existing confirmations required before a wick reaction counts.
const WICK_REACTION_GATE: usize = 5;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationKind {
    PoiTap,
    LiquiditySweep,
    FvgInversion,
    InversionTest,
    StructureBreak,
    FvgWickReaction,
    CvbTest,
    AdditionalCbos,
}

/// One confirmation event recorded inside a POI interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub kind: ConfirmationKind,
    pub timestamp: DateTime<Utc>,
    pub bar_index: usize,
    pub details: Map<String, Value>,
}

// ------------------------------------------------------------------------
// Individual checkers
// ------------------------------------------------------------------------

/// Bullish POI (demand below): the candle low reaches the zone top.
/// Bearish mirrors with the high against the zone bottom.
pub fn check_poi_tap(candle: &Candle, poi: &Poi) -> bool {
    match poi.direction {
        Direction::Bullish => candle.low.0 <= poi.top.0,
        Direction::Bearish => candle.high.0 >= poi.bottom.0,
    }
}

/// A liquidity level opposite the POI was swept: wick past it, close back.
pub fn check_liquidity_sweep(
    candle: &Candle,
    liquidity: &[&LiquidityLevel],
    poi_direction: Direction,
) -> Option<Map<String, Value>> {
    // A bullish POI wants sell-side liquidity (below) swept; bearish wants
    // buy-side (above).
    let target_dir = poi_direction.flipped();

    for level in liquidity {
        if level.direction != target_dir || level.status != LiquidityStatus::Active {
            continue;
        }
        let swept = match target_dir {
            Direction::Bearish => candle.low.0 < level.level.0 && candle.close.0 >= level.level.0,
            Direction::Bullish => candle.high.0 > level.level.0 && candle.close.0 <= level.level.0,
        };
        if swept {
            let mut details = Map::new();
            details.insert("level".into(), json!(level.level.0));
            details.insert("direction".into(), json!(target_dir.as_str()));
            return Some(details);
        }
    }
    None
}

/// An FVG opposing the POI inverted exactly at this bar.
pub fn check_fvg_inversion(
    lifecycle: &[FvgLifecycle],
    bar_index: usize,
    poi_direction: Direction,
) -> Option<Map<String, Value>> {
    let opposing = poi_direction.flipped();

    lifecycle
        .iter()
        .find(|entry| entry.inversion_index == Some(bar_index) && entry.direction == opposing)
        .map(|entry| fvg_entry_details(entry))
}

/// Price tests an already-inverted opposing FVG (now an IFVG in the POI's
/// direction). "Already" means the inversion bar has passed.
pub fn check_inversion_test(
    candle: &Candle,
    lifecycle: &[FvgLifecycle],
    bar_index: usize,
    poi_direction: Direction,
) -> Option<Map<String, Value>> {
    let opposing = poi_direction.flipped();

    for entry in lifecycle {
        if entry.status != FvgStatus::Inverted || entry.direction != opposing {
            continue;
        }
        let Some(inversion_index) = entry.inversion_index else {
            continue;
        };
        if inversion_index > bar_index {
            continue;
        }

        let tested = match poi_direction {
            Direction::Bullish => candle.low.0 <= entry.top.0,
            Direction::Bearish => candle.high.0 >= entry.bottom.0,
        };
        if tested {
            return Some(fvg_entry_details(entry));
        }
    }
    None
}

/// A BOS or cBOS at this bar in the POI direction.
pub fn check_structure_break(
    structure: &[StructureEvent],
    bar_index: usize,
    poi_direction: Direction,
) -> Option<Map<String, Value>> {
    structure
        .iter()
        .find(|e| e.broken_index == bar_index && e.direction == poi_direction)
        .map(structure_details)
}

/// The candle wicked into an active same-direction FVG and rejected it:
/// touch, close beyond the midpoint, and a non-zero rejection wick.
pub fn check_fvg_wick_reaction(
    candle: &Candle,
    fvgs: &[Fvg],
    poi_direction: Direction,
) -> Option<Map<String, Value>> {
    for fvg in fvgs {
        if !fvg.status.is_active() || fvg.direction != poi_direction {
            continue;
        }

        match poi_direction {
            Direction::Bullish => {
                let wick = candle.lower_wick();
                if candle.low.0 <= fvg.top.0 && candle.close.0 > fvg.midpoint.0 && wick > 0.0 {
                    let mut details = fvg_details(fvg);
                    details.insert("wick_size".into(), json!(wick));
                    return Some(details);
                }
            }
            Direction::Bearish => {
                let wick = candle.upper_wick();
                if candle.high.0 >= fvg.bottom.0 && candle.close.0 < fvg.midpoint.0 && wick > 0.0 {
                    let mut details = fvg_details(fvg);
                    details.insert("wick_size".into(), json!(wick));
                    return Some(details);
                }
            }
        }
    }
    None
}

/// Price tested the consequent encroachment (midpoint) of an active
/// same-direction FVG, within tolerance.
pub fn check_cvb_test(
    candle: &Candle,
    fvgs: &[Fvg],
    poi_direction: Direction,
) -> Option<Map<String, Value>> {
    for fvg in fvgs {
        if !fvg.status.is_active() || fvg.direction != poi_direction {
            continue;
        }

        let reached = match poi_direction {
            Direction::Bullish => candle.low.0 <= fvg.midpoint.0 * (1.0 + CVB_TOLERANCE_PCT),
            Direction::Bearish => candle.high.0 >= fvg.midpoint.0 * (1.0 - CVB_TOLERANCE_PCT),
        };
        if reached {
            return Some(fvg_details(fvg));
        }
    }
    None
}

/// A continuation break at this bar, counted only once a STRUCTURE_BREAK
/// confirmation is already on record.
pub fn check_additional_cbos(
    structure: &[StructureEvent],
    bar_index: usize,
    poi_direction: Direction,
    existing: &[Confirmation],
) -> Option<Map<String, Value>> {
    let has_prior_break = existing
        .iter()
        .any(|c| c.kind == ConfirmationKind::StructureBreak);
    if !has_prior_break {
        return None;
    }

    structure
        .iter()
        .find(|e| {
            e.broken_index == bar_index
                && e.direction == poi_direction
                && e.kind == StructureKind::Cbos
        })
        .map(structure_details)
}

fn fvg_details(fvg: &Fvg) -> Map<String, Value> {
    let mut details = Map::new();
    details.insert("direction".into(), json!(fvg.direction.as_str()));
    details.insert("top".into(), json!(fvg.top.0));
    details.insert("bottom".into(), json!(fvg.bottom.0));
    details.insert("midpoint".into(), json!(fvg.midpoint.0));
    details
}

fn fvg_entry_details(entry: &FvgLifecycle) -> Map<String, Value> {
    let mut details = Map::new();
    details.insert("fvg_idx".into(), json!(entry.fvg_idx));
    details.insert("direction".into(), json!(entry.direction.as_str()));
    details.insert("top".into(), json!(entry.top.0));
    details.insert("bottom".into(), json!(entry.bottom.0));
    details.insert("midpoint".into(), json!(entry.midpoint.0));
    if let Some(idx) = entry.inversion_index {
        details.insert("inversion_index".into(), json!(idx));
    }
    details
}

fn structure_details(event: &StructureEvent) -> Map<String, Value> {
    let mut details = Map::new();
    details.insert("type".into(), json!(event.kind.to_string()));
    details.insert("direction".into(), json!(event.direction.as_str()));
    details.insert("broken_level".into(), json!(event.broken_level.0));
    details
}

// ------------------------------------------------------------------------
// Master collection
// ------------------------------------------------------------------------

/// Run all checkers in catalog order and return the extended list.
///
/// The FVG_WICK_REACTION gate inspects the caller's `existing` list only;
/// confirmations appended earlier on the same bar do not count toward it.
#[allow(clippy::too_many_arguments)]
pub fn collect_confirmations(
    candle: &Candle,
    bar_index: usize,
    timestamp: DateTime<Utc>,
    poi: &Poi,
    existing: &[Confirmation],
    nearby_fvgs: &[Fvg],
    fvg_lifecycle: &[FvgLifecycle],
    nearby_liquidity: &[&LiquidityLevel],
    structure: &[StructureEvent],
    config: &ConfirmationsConfig,
) -> Vec<Confirmation> {
    let mut confirms: Vec<Confirmation> = existing.to_vec();
    let direction = poi.direction;

    let add = |confirms: &mut Vec<Confirmation>,
               kind: ConfirmationKind,
               details: Map<String, Value>| {
        if confirms.len() >= config.max_count {
            return;
        }
        if confirms
            .iter()
            .any(|c| c.kind == kind && c.bar_index == bar_index)
        {
            return;
        }
        confirms.push(Confirmation {
            kind,
            timestamp,
            bar_index,
            details,
        });
    };

    // 1. POI tap
    if check_poi_tap(candle, poi) {
        add(&mut confirms, ConfirmationKind::PoiTap, Map::new());
    }

    // 2. Liquidity sweep
    if let Some(details) = check_liquidity_sweep(candle, nearby_liquidity, direction) {
        add(&mut confirms, ConfirmationKind::LiquiditySweep, details);
    }

    // 3. FVG inversion
    if let Some(details) = check_fvg_inversion(fvg_lifecycle, bar_index, direction) {
        add(&mut confirms, ConfirmationKind::FvgInversion, details);
    }

    // 4. Inversion test
    if let Some(details) = check_inversion_test(candle, fvg_lifecycle, bar_index, direction) {
        add(&mut confirms, ConfirmationKind::InversionTest, details);
    }

    // 5. Structure break
    if let Some(details) = check_structure_break(structure, bar_index, direction) {
        add(&mut confirms, ConfirmationKind::StructureBreak, details);
    }

    // 6. FVG wick reaction, gated on pre-existing confirmations only.
    if existing.len() >= WICK_REACTION_GATE {
        if let Some(details) = check_fvg_wick_reaction(candle, nearby_fvgs, direction) {
            add(&mut confirms, ConfirmationKind::FvgWickReaction, details);
        }
    }

    // 7. CVB test
    if let Some(details) = check_cvb_test(candle, nearby_fvgs, direction) {
        add(&mut confirms, ConfirmationKind::CvbTest, details);
    }

    // 8. Additional cBOS, checked against the running list.
    if let Some(details) = check_additional_cbos(structure, bar_index, direction, &confirms) {
        add(&mut confirms, ConfirmationKind::AdditionalCbos, details);
    }

    confirms
}

/// Minimum confirmation threshold reached.
pub fn is_ready(confirms: &[Confirmation], config: &ConfirmationsConfig) -> bool {
    confirms.len() >= config.min_count
}

/// The "5th confirm trap": five or more confirmations, none of them
/// FVG-related, and the last one structural. Price left the POI without
/// ever retouching a gap, so the strategy should wait for a return.
pub fn has_fifth_confirm_trap(confirms: &[Confirmation]) -> bool {
    if confirms.len() < 5 {
        return false;
    }

    let fvg_related = confirms.iter().any(|c| {
        matches!(
            c.kind,
            ConfirmationKind::FvgInversion
                | ConfirmationKind::InversionTest
                | ConfirmationKind::FvgWickReaction
        )
    });
    if fvg_related {
        return false;
    }

    matches!(
        confirms.last().map(|c| c.kind),
        Some(ConfirmationKind::StructureBreak) | Some(ConfirmationKind::AdditionalCbos)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        concepts::poi::{ComponentKind, Freshness, PoiComponent, PoiStatus},
        data::domain::Price,
    };
    use chrono::TimeZone;
    use smallvec::smallvec;

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(minute * 60, 0).unwrap()
    }

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: ts(0),
            open: Price(open),
            high: Price(high),
            low: Price(low),
            close: Price(close),
            volume: 1,
        }
    }

    fn bullish_poi(top: f64, bottom: f64) -> Poi {
        Poi {
            direction: Direction::Bullish,
            top: Price(top),
            bottom: Price(bottom),
            midpoint: Price((top + bottom) / 2.0),
            score: 3.0,
            components: smallvec![PoiComponent {
                kind: ComponentKind::FvgLtf,
                source_index: 0,
                freshness: Freshness::Fresh,
            }],
            status: PoiStatus::Active,
            creation_time: ts(0),
        }
    }

    fn bearish_poi(top: f64, bottom: f64) -> Poi {
        Poi {
            direction: Direction::Bearish,
            ..bullish_poi(top, bottom)
        }
    }

    fn fvg(direction: Direction, top: f64, bottom: f64) -> Fvg {
        Fvg {
            direction,
            top: Price(top),
            bottom: Price(bottom),
            midpoint: Price((top + bottom) / 2.0),
            start_index: 0,
            creation_index: 2,
            status: FvgStatus::Fresh,
        }
    }

    fn lifecycle_entry(
        direction: Direction,
        top: f64,
        bottom: f64,
        inversion_index: Option<usize>,
    ) -> FvgLifecycle {
        FvgLifecycle {
            fvg_idx: 0,
            direction,
            top: Price(top),
            bottom: Price(bottom),
            midpoint: Price((top + bottom) / 2.0),
            start_index: 0,
            creation_index: 2,
            end_index: inversion_index.unwrap_or(10),
            status: if inversion_index.is_some() {
                FvgStatus::Inverted
            } else {
                FvgStatus::Fresh
            },
            fill_level: None,
            inversion_index,
        }
    }

    fn structure_event(kind: StructureKind, direction: Direction, bar: usize) -> StructureEvent {
        StructureEvent {
            kind,
            direction,
            broken_level: Price(105.0),
            broken_index: bar,
            swing_index: bar.saturating_sub(3),
        }
    }

    fn liquidity_level(direction: Direction, level: f64) -> LiquidityLevel {
        LiquidityLevel {
            direction,
            level: Price(level),
            count: 3,
            source_indices: smallvec![1, 2, 3],
            status: LiquidityStatus::Active,
        }
    }

    fn confirmation(kind: ConfirmationKind, bar_index: usize) -> Confirmation {
        Confirmation {
            kind,
            timestamp: ts(bar_index as i64),
            bar_index,
            details: Map::new(),
        }
    }

    fn collect_simple(
        candle: &Candle,
        bar_index: usize,
        poi: &Poi,
        existing: &[Confirmation],
        structure: &[StructureEvent],
    ) -> Vec<Confirmation> {
        collect_confirmations(
            candle,
            bar_index,
            ts(bar_index as i64),
            poi,
            existing,
            &[],
            &[],
            &[],
            structure,
            &ConfirmationsConfig::default(),
        )
    }

    // ============================================================================
    // Individual checkers
    // ============================================================================

    #[test]
    fn poi_tap_bullish_and_bearish() {
        let poi = bullish_poi(103.0, 101.0);
        assert!(check_poi_tap(&candle(104.0, 104.5, 102.8, 104.0), &poi), "low into zone");
        assert!(!check_poi_tap(&candle(104.0, 104.5, 103.5, 104.0), &poi), "low above zone");

        let poi = bearish_poi(108.0, 106.0);
        assert!(check_poi_tap(&candle(105.0, 106.2, 104.8, 105.0), &poi), "high into zone");
        assert!(!check_poi_tap(&candle(105.0, 105.8, 104.8, 105.0), &poi));
    }

    #[test]
    fn liquidity_sweep_needs_wick_and_reclaim() {
        let levels = [liquidity_level(Direction::Bearish, 100.0)];
        let refs: Vec<&LiquidityLevel> = levels.iter().collect();

        // Bullish POI: sell-side sweep is low < level, close >= level.
        let swept = check_liquidity_sweep(
            &candle(100.5, 101.0, 99.5, 100.2),
            &refs,
            Direction::Bullish,
        );
        assert!(swept.is_some(), "wick below 100 with close above is a sweep");

        let broke = check_liquidity_sweep(
            &candle(100.5, 101.0, 99.5, 99.8),
            &refs,
            Direction::Bullish,
        );
        assert!(broke.is_none(), "close below the level is a break, not a sweep");

        // Wrong-side liquidity never fires.
        let wrong_side = check_liquidity_sweep(
            &candle(100.5, 101.0, 99.5, 100.2),
            &refs,
            Direction::Bearish,
        );
        assert!(wrong_side.is_none(), "bearish POI wants buy-side liquidity");
    }

    #[test]
    fn fvg_inversion_matches_exact_bar() {
        let lifecycle = [lifecycle_entry(Direction::Bearish, 105.0, 104.0, Some(7))];

        assert!(check_fvg_inversion(&lifecycle, 7, Direction::Bullish).is_some());
        assert!(
            check_fvg_inversion(&lifecycle, 8, Direction::Bullish).is_none(),
            "only the inversion bar itself fires"
        );
        assert!(
            check_fvg_inversion(&lifecycle, 7, Direction::Bearish).is_none(),
            "same-direction inversion is not a confirmation"
        );
    }

    #[test]
    fn inversion_test_requires_inversion_in_the_past() {
        let lifecycle = [lifecycle_entry(Direction::Bearish, 105.0, 104.0, Some(7))];
        let touching = candle(106.0, 106.5, 104.8, 106.0); // low 104.8 <= top 105

        assert!(
            check_inversion_test(&touching, &lifecycle, 9, Direction::Bullish).is_some(),
            "touch after the inversion bar fires"
        );
        assert!(
            check_inversion_test(&touching, &lifecycle, 5, Direction::Bullish).is_none(),
            "an inversion that has not happened yet must be invisible"
        );

        let above = candle(106.0, 106.5, 105.2, 106.0);
        assert!(
            check_inversion_test(&above, &lifecycle, 9, Direction::Bullish).is_none(),
            "no touch, no test"
        );
    }

    #[test]
    fn structure_break_matches_bar_and_direction() {
        let events = [structure_event(StructureKind::Bos, Direction::Bullish, 12)];

        assert!(check_structure_break(&events, 12, Direction::Bullish).is_some());
        assert!(check_structure_break(&events, 11, Direction::Bullish).is_none());
        assert!(check_structure_break(&events, 12, Direction::Bearish).is_none());
    }

    #[test]
    fn wick_reaction_needs_touch_reclaim_and_wick() {
        let fvgs = [fvg(Direction::Bullish, 103.0, 101.0)]; // midpoint 102

        // Touch (low 102.5 <= 103), close above midpoint, lower wick > 0.
        let good = candle(103.5, 104.0, 102.5, 103.8);
        assert!(check_fvg_wick_reaction(&good, &fvgs, Direction::Bullish).is_some());

        // Close below midpoint fails the reclaim.
        let weak_close = candle(103.5, 104.0, 101.5, 101.8);
        assert!(check_fvg_wick_reaction(&weak_close, &fvgs, Direction::Bullish).is_none());

        // No lower wick: body low equals the low.
        let no_wick = candle(102.5, 104.0, 102.5, 103.8);
        assert!(check_fvg_wick_reaction(&no_wick, &fvgs, Direction::Bullish).is_none());
    }

    #[test]
    fn cvb_test_uses_midpoint_with_tolerance() {
        let fvgs = [fvg(Direction::Bullish, 103.0, 101.0)]; // midpoint 102

        // Low 102.1 <= 102 * 1.001 = 102.102.
        assert!(check_cvb_test(&candle(103.0, 103.5, 102.1, 103.0), &fvgs, Direction::Bullish).is_some());
        // Low 102.2 misses the tolerance band.
        assert!(check_cvb_test(&candle(103.0, 103.5, 102.2, 103.0), &fvgs, Direction::Bullish).is_none());
    }

    #[test]
    fn additional_cbos_requires_prior_structure_break() {
        let events = [structure_event(StructureKind::Cbos, Direction::Bullish, 20)];

        let none = check_additional_cbos(&events, 20, Direction::Bullish, &[]);
        assert!(none.is_none(), "no prior STRUCTURE_BREAK on record");

        let prior = vec![confirmation(ConfirmationKind::StructureBreak, 15)];
        let some = check_additional_cbos(&events, 20, Direction::Bullish, &prior);
        assert!(some.is_some());

        // A BOS at the bar does not satisfy the cBOS requirement.
        let bos = [structure_event(StructureKind::Bos, Direction::Bullish, 20)];
        assert!(check_additional_cbos(&bos, 20, Direction::Bullish, &prior).is_none());
    }

    // ============================================================================
    // Collection rules
    // ============================================================================

    #[test]
    fn collection_does_not_mutate_input() {
        let poi = bullish_poi(103.0, 101.0);
        let existing = vec![confirmation(ConfirmationKind::PoiTap, 1)];
        let tapping = candle(104.0, 104.5, 102.5, 104.0);

        let out = collect_simple(&tapping, 5, &poi, &existing, &[]);
        assert_eq!(existing.len(), 1, "input list untouched");
        assert_eq!(out.len(), 2, "new tap at bar 5 appended");
    }

    #[test]
    fn duplicate_kind_and_bar_is_suppressed() {
        let poi = bullish_poi(103.0, 101.0);
        let tapping = candle(104.0, 104.5, 102.5, 104.0);

        let once = collect_simple(&tapping, 5, &poi, &[], &[]);
        let twice = collect_simple(&tapping, 5, &poi, &once, &[]);
        assert_eq!(once.len(), twice.len(), "re-evaluating the same bar adds nothing");
    }

    #[test]
    fn same_kind_on_a_new_bar_is_counted() {
        let poi = bullish_poi(103.0, 101.0);
        let tapping = candle(104.0, 104.5, 102.5, 104.0);

        let first = collect_simple(&tapping, 5, &poi, &[], &[]);
        let second = collect_simple(&tapping, 6, &poi, &first, &[]);
        assert_eq!(second.len(), first.len() + 1, "a new bar makes a new tap");
    }

    #[test]
    fn cap_stops_further_appends() {
        let poi = bullish_poi(103.0, 101.0);
        let tapping = candle(104.0, 104.5, 102.5, 104.0);
        let config = ConfirmationsConfig {
            min_count: 2,
            max_count: 3,
        };

        let existing: Vec<Confirmation> = (0..3)
            .map(|i| confirmation(ConfirmationKind::PoiTap, i))
            .collect();

        let out = collect_confirmations(
            &tapping,
            10,
            ts(10),
            &poi,
            &existing,
            &[],
            &[],
            &[],
            &[],
            &config,
        );
        assert_eq!(out.len(), 3, "the cap blocks appends");
    }

    #[test]
    fn wick_reaction_gate_counts_preexisting_only() {
        let poi = bullish_poi(103.0, 101.0);
        let fvgs = [fvg(Direction::Bullish, 103.0, 101.0)];
        // Candle that taps, reclaims the midpoint, and leaves a wick.
        let reacting = candle(103.5, 104.0, 102.5, 103.8);

        // Four pre-existing confirmations: the tap of this bar would push
        // the running list to five, but the gate must look at `existing`.
        let existing: Vec<Confirmation> = (0..4)
            .map(|i| confirmation(ConfirmationKind::CvbTest, i))
            .collect();

        let out = collect_confirmations(
            &reacting,
            10,
            ts(10),
            &poi,
            &existing,
            &fvgs,
            &[],
            &[],
            &[],
            &ConfirmationsConfig::default(),
        );
        assert!(
            out.iter().all(|c| c.kind != ConfirmationKind::FvgWickReaction),
            "four pre-existing confirmations must not open the gate"
        );

        let existing: Vec<Confirmation> = (0..5)
            .map(|i| confirmation(ConfirmationKind::CvbTest, i))
            .collect();
        let out = collect_confirmations(
            &reacting,
            10,
            ts(10),
            &poi,
            &existing,
            &fvgs,
            &[],
            &[],
            &[],
            &ConfirmationsConfig::default(),
        );
        assert!(
            out.iter().any(|c| c.kind == ConfirmationKind::FvgWickReaction),
            "five pre-existing confirmations open the gate"
        );
    }

    #[test]
    fn additional_cbos_sees_the_break_added_this_bar() {
        // A cBOS at the bar that also carries the first structure break:
        // checker 8 runs against the running list, so both are recorded.
        let poi = bullish_poi(103.0, 101.0);
        let tapping = candle(104.0, 104.5, 102.5, 104.0);
        let events = [structure_event(StructureKind::Cbos, Direction::Bullish, 5)];

        let out = collect_simple(&tapping, 5, &poi, &[], &events);
        let kinds: Vec<ConfirmationKind> = out.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&ConfirmationKind::StructureBreak));
        assert!(
            kinds.contains(&ConfirmationKind::AdditionalCbos),
            "the break recorded earlier this bar satisfies the prerequisite"
        );
    }

    // ============================================================================
    // Derived predicates
    // ============================================================================

    #[test]
    fn readiness_threshold() {
        let config = ConfirmationsConfig::default();
        let four: Vec<Confirmation> = (0..4)
            .map(|i| confirmation(ConfirmationKind::PoiTap, i))
            .collect();
        let five: Vec<Confirmation> = (0..5)
            .map(|i| confirmation(ConfirmationKind::PoiTap, i))
            .collect();

        assert!(!is_ready(&four, &config));
        assert!(is_ready(&five, &config));
    }

    #[test]
    fn fifth_confirm_trap_detection() {
        // Five structural/non-FVG confirmations ending in a break: trap.
        let trapped = vec![
            confirmation(ConfirmationKind::PoiTap, 1),
            confirmation(ConfirmationKind::LiquiditySweep, 2),
            confirmation(ConfirmationKind::PoiTap, 3),
            confirmation(ConfirmationKind::CvbTest, 4),
            confirmation(ConfirmationKind::StructureBreak, 5),
        ];
        assert!(has_fifth_confirm_trap(&trapped));

        // An FVG-related confirmation anywhere defuses it.
        let mut with_fvg = trapped.clone();
        with_fvg[3] = confirmation(ConfirmationKind::InversionTest, 4);
        assert!(!has_fifth_confirm_trap(&with_fvg));

        // A non-structural last element defuses it.
        let mut tap_last = trapped.clone();
        tap_last.push(confirmation(ConfirmationKind::PoiTap, 6));
        assert!(!has_fifth_confirm_trap(&tap_last));

        // Fewer than five never traps.
        assert!(!has_fifth_confirm_trap(&trapped[..4]));
    }
}
