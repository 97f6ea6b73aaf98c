//! POI lifecycle state machine.
//!
//! Phase graph:
//!
//! ```text
//! IDLE --tap--> TAPPED --same bar--> COLLECTING --ready--> READY
//! READY --entry (external)--> POSITIONED
//! POSITIONED --move-to-be (external)--> MANAGING
//! {POSITIONED|MANAGING} --exit (external)--> CLOSED
//! IDLE --invalidation--> CLOSED
//! ```
//!
//! The ticker advances IDLE/TAPPED/COLLECTING only; READY and beyond move
//! through external calls from the strategy and engine layers. CLOSED is
//! terminal.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    concepts::{
        fvg::{Fvg, FvgLifecycle},
        liquidity::LiquidityLevel,
        poi::Poi,
        structure::StructureEvent,
    },
    config::ConfirmationsConfig,
    data::{candle::Candle, domain::Timeframe},
    error::{EngineError, ZonalResult},
    strategy::confirmations::{
        Confirmation, check_poi_tap, collect_confirmations, is_ready,
    },
};

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
pub enum PoiPhase {
    Idle,
    Tapped,
    Collecting,
    Ready,
    Positioned,
    Managing,
    Closed,
}

/// Per-bar view of the base-timeframe concept tables, built from the
/// time-gated MTF queries so the ticker can never see the future.
#[derive(Debug, Clone)]
pub struct ConceptView<'a> {
    pub fvgs: &'a [Fvg],
    pub fvg_lifecycle: &'a [FvgLifecycle],
    pub liquidity: Vec<&'a LiquidityLevel>,
    pub structure: &'a [StructureEvent],
}

/// State record of one tracked POI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiStateRecord {
    pub poi_id: String,
    pub poi: Poi,
    pub timeframe: Timeframe,
    pub phase: PoiPhase,
    pub confirmations: Vec<Confirmation>,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
    pub breakeven_level: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Advance one record through the tick-driven part of the phase graph.
fn tick_record(
    record: &mut PoiStateRecord,
    candle: &Candle,
    bar_index: usize,
    timestamp: DateTime<Utc>,
    view: &ConceptView<'_>,
    config: &ConfirmationsConfig,
) {
    record.last_updated = timestamp;

    if record.phase == PoiPhase::Idle {
        if check_poi_tap(candle, &record.poi) {
            record.phase = PoiPhase::Tapped;
            // Collection starts on the tap bar itself.
        } else {
            return;
        }
    }

    if matches!(record.phase, PoiPhase::Tapped | PoiPhase::Collecting) {
        record.phase = PoiPhase::Collecting;
        record.confirmations = collect_confirmations(
            candle,
            bar_index,
            timestamp,
            &record.poi,
            &record.confirmations,
            view.fvgs,
            view.fvg_lifecycle,
            &view.liquidity,
            view.structure,
            config,
        );

        if is_ready(&record.confirmations, config) {
            record.phase = PoiPhase::Ready;
        }
    }
}

/// Owner of all POI state records, keyed by POI id.
#[derive(Debug)]
pub struct StateMachineManager {
    config: ConfirmationsConfig,
    states: BTreeMap<String, PoiStateRecord>,
    /// Six-decimal zone fingerprints guarding against double registration.
    fingerprints: BTreeSet<String>,
    next_index: u64,
}

impl StateMachineManager {
    pub fn new(config: ConfirmationsConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
            fingerprints: BTreeSet::new(),
            next_index: 0,
        }
    }

    /// Register a POI for tracking. Returns `None` when an identical zone
    /// (timeframe, direction, top, bottom to six decimals) is already
    /// registered.
    pub fn register_poi(
        &mut self,
        poi: Poi,
        timeframe: Timeframe,
        timestamp: DateTime<Utc>,
    ) -> Option<String> {
        let fingerprint = format!(
            "{}_{}_{:.6}_{:.6}",
            timeframe, poi.direction, poi.top.0, poi.bottom.0
        );
        if !self.fingerprints.insert(fingerprint) {
            return None;
        }

        let poi_id = format!(
            "{}_{}_{}",
            timeframe,
            poi.direction.sign() as i64,
            self.next_index
        );
        self.next_index += 1;

        self.states.insert(
            poi_id.clone(),
            PoiStateRecord {
                poi_id: poi_id.clone(),
                poi,
                timeframe,
                phase: PoiPhase::Idle,
                confirmations: Vec::new(),
                entry_price: None,
                stop_loss: None,
                target: None,
                breakeven_level: None,
                created_at: timestamp,
                last_updated: timestamp,
            },
        );
        Some(poi_id)
    }

    /// Tick every IDLE/TAPPED/COLLECTING record with the current bar.
    /// Returns the ids of POIs tapped on this bar.
    pub fn tick(
        &mut self,
        candle: &Candle,
        bar_index: usize,
        timestamp: DateTime<Utc>,
        view: &ConceptView<'_>,
    ) -> Vec<String> {
        let mut tapped = Vec::new();

        for (poi_id, record) in self.states.iter_mut() {
            if !matches!(
                record.phase,
                PoiPhase::Idle | PoiPhase::Tapped | PoiPhase::Collecting
            ) {
                continue;
            }
            let was_idle = record.phase == PoiPhase::Idle;
            tick_record(record, candle, bar_index, timestamp, view, &self.config);
            if was_idle && record.phase != PoiPhase::Idle {
                tapped.push(poi_id.clone());
            }
        }

        tapped
    }

    pub fn state(&self, poi_id: &str) -> ZonalResult<&PoiStateRecord> {
        self.states
            .get(poi_id)
            .ok_or_else(|| EngineError::UnknownPoi(poi_id.to_string()).into())
    }

    /// All records not yet CLOSED.
    pub fn active_states(&self) -> Vec<&PoiStateRecord> {
        self.states
            .values()
            .filter(|s| s.phase != PoiPhase::Closed)
            .collect()
    }

    pub fn ready_states(&self) -> Vec<&PoiStateRecord> {
        self.states
            .values()
            .filter(|s| s.phase == PoiPhase::Ready)
            .collect()
    }

    /// POSITIONED and MANAGING records.
    pub fn positioned_states(&self) -> Vec<&PoiStateRecord> {
        self.states
            .values()
            .filter(|s| matches!(s.phase, PoiPhase::Positioned | PoiPhase::Managing))
            .collect()
    }

    /// Entry accepted: READY becomes POSITIONED with the actual fill.
    pub fn set_positioned(
        &mut self,
        poi_id: &str,
        entry_price: f64,
        stop_loss: f64,
        target: f64,
    ) -> ZonalResult<()> {
        let record = self.state_mut(poi_id)?;
        record.phase = PoiPhase::Positioned;
        record.entry_price = Some(entry_price);
        record.stop_loss = Some(stop_loss);
        record.target = Some(target);
        Ok(())
    }

    /// Break-even moved: POSITIONED becomes MANAGING with the new stop.
    pub fn move_to_breakeven(&mut self, poi_id: &str, breakeven_level: f64) -> ZonalResult<()> {
        let record = self.state_mut(poi_id)?;
        record.breakeven_level = Some(breakeven_level);
        record.stop_loss = Some(breakeven_level);
        record.phase = PoiPhase::Managing;
        Ok(())
    }

    /// Terminal transition, from an exit or an explicit invalidation.
    pub fn close(&mut self, poi_id: &str) -> ZonalResult<()> {
        let record = self.state_mut(poi_id)?;
        record.phase = PoiPhase::Closed;
        Ok(())
    }

    fn state_mut(&mut self, poi_id: &str) -> ZonalResult<&mut PoiStateRecord> {
        self.states
            .get_mut(poi_id)
            .ok_or_else(|| EngineError::UnknownPoi(poi_id.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        concepts::poi::{ComponentKind, Freshness, PoiComponent, PoiStatus},
        data::domain::{Direction, Price},
        strategy::confirmations::ConfirmationKind,
    };
    use chrono::TimeZone;
    use smallvec::smallvec;

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(minute * 60, 0).unwrap()
    }

    fn candle(minute: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: ts(minute),
            open: Price(open),
            high: Price(high),
            low: Price(low),
            close: Price(close),
            volume: 1,
        }
    }

    fn demand_poi(top: f64, bottom: f64) -> Poi {
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

    fn empty_view<'a>() -> ConceptView<'a> {
        ConceptView {
            fvgs: &[],
            fvg_lifecycle: &[],
            liquidity: Vec::new(),
            structure: &[],
        }
    }

    fn manager() -> StateMachineManager {
        StateMachineManager::new(ConfirmationsConfig::default())
    }

    #[test]
    fn poi_id_format() {
        let mut sm = manager();
        let id = sm
            .register_poi(demand_poi(103.0, 101.0), Timeframe::H4, ts(0))
            .expect("first registration succeeds");
        assert_eq!(id, "4H_1_0");

        let mut bearish = demand_poi(110.0, 108.0);
        bearish.direction = Direction::Bearish;
        let id = sm
            .register_poi(bearish, Timeframe::M15, ts(0))
            .expect("second registration succeeds");
        assert_eq!(id, "15m_-1_1", "sequential index and signed direction");
    }

    #[test]
    fn duplicate_zone_is_rejected() {
        let mut sm = manager();
        assert!(sm.register_poi(demand_poi(103.0, 101.0), Timeframe::H4, ts(0)).is_some());
        assert!(
            sm.register_poi(demand_poi(103.0, 101.0), Timeframe::H4, ts(5)).is_none(),
            "identical (tf, direction, top, bottom) must not register twice"
        );
        // A different timeframe is a different identity.
        assert!(sm.register_poi(demand_poi(103.0, 101.0), Timeframe::H1, ts(5)).is_some());
    }

    #[test]
    fn idle_stays_idle_without_tap() {
        let mut sm = manager();
        let id = sm.register_poi(demand_poi(103.0, 101.0), Timeframe::M15, ts(0)).unwrap();

        sm.tick(&candle(1, 105.0, 105.5, 104.0, 105.0), 1, ts(1), &empty_view());
        assert_eq!(sm.state(&id).unwrap().phase, PoiPhase::Idle);
    }

    #[test]
    fn tap_advances_through_collecting_on_the_same_bar() {
        let mut sm = manager();
        let id = sm.register_poi(demand_poi(103.0, 101.0), Timeframe::M15, ts(0)).unwrap();

        let tapped = sm.tick(&candle(1, 104.0, 104.5, 102.5, 104.0), 1, ts(1), &empty_view());
        assert_eq!(tapped, vec![id.clone()], "tap reported");

        let state = sm.state(&id).unwrap();
        assert_eq!(state.phase, PoiPhase::Collecting, "tap collects on the same bar");
        assert_eq!(state.confirmations.len(), 1, "the tap itself is confirmation #1");
        assert_eq!(state.confirmations[0].kind, ConfirmationKind::PoiTap);
    }

    #[test]
    fn collecting_reaches_ready_at_min_count() {
        let mut sm = StateMachineManager::new(ConfirmationsConfig {
            min_count: 3,
            max_count: 8,
        });
        let id = sm.register_poi(demand_poi(103.0, 101.0), Timeframe::M15, ts(0)).unwrap();

        // Each tapping bar adds one PoiTap confirmation (distinct bars).
        for bar in 1..=3 {
            sm.tick(
                &candle(bar as i64, 104.0, 104.5, 102.5, 104.0),
                bar,
                ts(bar as i64),
                &empty_view(),
            );
        }

        let state = sm.state(&id).unwrap();
        assert_eq!(state.confirmations.len(), 3);
        assert_eq!(state.phase, PoiPhase::Ready);
    }

    #[test]
    fn ready_is_not_advanced_by_the_ticker() {
        let mut sm = StateMachineManager::new(ConfirmationsConfig {
            min_count: 1,
            max_count: 8,
        });
        let id = sm.register_poi(demand_poi(103.0, 101.0), Timeframe::M15, ts(0)).unwrap();

        sm.tick(&candle(1, 104.0, 104.5, 102.5, 104.0), 1, ts(1), &empty_view());
        assert_eq!(sm.state(&id).unwrap().phase, PoiPhase::Ready);

        let before = sm.state(&id).unwrap().confirmations.len();
        sm.tick(&candle(2, 104.0, 104.5, 102.5, 104.0), 2, ts(2), &empty_view());
        assert_eq!(
            sm.state(&id).unwrap().confirmations.len(),
            before,
            "READY records are external-only"
        );
    }

    #[test]
    fn external_transitions_follow_the_phase_graph() {
        let mut sm = StateMachineManager::new(ConfirmationsConfig {
            min_count: 1,
            max_count: 8,
        });
        let id = sm.register_poi(demand_poi(103.0, 101.0), Timeframe::M15, ts(0)).unwrap();
        sm.tick(&candle(1, 104.0, 104.5, 102.5, 104.0), 1, ts(1), &empty_view());

        sm.set_positioned(&id, 103.5, 100.5, 110.0).unwrap();
        let state = sm.state(&id).unwrap();
        assert_eq!(state.phase, PoiPhase::Positioned);
        assert_eq!(state.entry_price, Some(103.5));

        sm.move_to_breakeven(&id, 103.62).unwrap();
        let state = sm.state(&id).unwrap();
        assert_eq!(state.phase, PoiPhase::Managing);
        assert_eq!(state.stop_loss, Some(103.62), "BE move rewrites the stop");

        sm.close(&id).unwrap();
        assert_eq!(sm.state(&id).unwrap().phase, PoiPhase::Closed);

        // Closed records are invisible to the phase queries and the ticker.
        assert!(sm.active_states().is_empty());
        assert!(sm.positioned_states().is_empty());
        let tapped = sm.tick(&candle(9, 104.0, 104.5, 102.5, 104.0), 9, ts(9), &empty_view());
        assert!(tapped.is_empty(), "terminal records never tick");
    }

    #[test]
    fn phase_queries_partition_records() {
        let mut sm = StateMachineManager::new(ConfirmationsConfig {
            min_count: 1,
            max_count: 8,
        });
        let ready_id = sm.register_poi(demand_poi(103.0, 101.0), Timeframe::M15, ts(0)).unwrap();
        let idle_id = sm.register_poi(demand_poi(93.0, 91.0), Timeframe::M15, ts(0)).unwrap();

        // Taps only the first zone.
        sm.tick(&candle(1, 104.0, 104.5, 102.5, 104.0), 1, ts(1), &empty_view());
        sm.set_positioned(&ready_id, 103.5, 100.5, 110.0).unwrap();

        assert_eq!(sm.positioned_states().len(), 1);
        assert_eq!(sm.positioned_states()[0].poi_id, ready_id);
        assert!(sm.ready_states().is_empty());
        assert_eq!(sm.active_states().len(), 2);
        assert_eq!(sm.state(&idle_id).unwrap().phase, PoiPhase::Idle);
    }

    #[test]
    fn unknown_poi_id_errors() {
        let mut sm = manager();
        assert!(sm.state("missing").is_err());
        assert!(sm.close("missing").is_err());
        assert!(sm.set_positioned("missing", 1.0, 0.5, 2.0).is_err());
    }
}
