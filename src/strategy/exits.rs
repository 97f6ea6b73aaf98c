//! Exit decisions: stop and target hits, break-even management, and
//! target selection.
//!
//! Priority per bar: stop-loss before target (a bar that spans both is a
//! stop hit), then structural break-even, then FTA break-even.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::{
    concepts::{poi::Poi, structure::StructureEvent, swings::SwingPoint},
    config::StrategyConfig,
    context::machine::{PoiPhase, PoiStateRecord},
    data::domain::{Direction, Timeframe},
    strategy::{ExitReason, Signal, SignalKind, fta::Fta, risk::breakeven_level},
};

/// Long: the bar's high reached the target. Short mirrors on the low.
pub fn check_target_hit(
    candle_high: f64,
    candle_low: f64,
    target: f64,
    direction: Direction,
) -> bool {
    match direction {
        Direction::Bullish => candle_high >= target,
        Direction::Bearish => candle_low <= target,
    }
}

/// Long: the bar's low reached the stop. Short mirrors on the high.
pub fn check_stop_loss_hit(
    candle_high: f64,
    candle_low: f64,
    stop_loss: f64,
    direction: Direction,
) -> bool {
    match direction {
        Direction::Bullish => candle_low <= stop_loss,
        Direction::Bearish => candle_high >= stop_loss,
    }
}

/// Pick the target for a prospective trade.
///
/// Nearest same-side swing beyond price in the trade direction; falling
/// back to the nearest opposing POI on the path; finally +/-3% of price.
pub fn select_target(
    direction: Direction,
    current_price: f64,
    active_pois: &[(Timeframe, &Poi)],
    swing_points: &[SwingPoint],
) -> f64 {
    match direction {
        Direction::Bullish => {
            let swing = swing_points
                .iter()
                .filter(|p| p.direction == Direction::Bullish && p.level.0 > current_price)
                .map(|p| p.level.0)
                .min_by(|a, b| a.total_cmp(b));
            if let Some(level) = swing {
                return level;
            }

            let opposing = active_pois
                .iter()
                .filter(|(_, p)| {
                    p.direction == Direction::Bearish && p.bottom.0 > current_price
                })
                .map(|(_, p)| p.bottom.0)
                .min_by(|a, b| a.total_cmp(b));
            if let Some(level) = opposing {
                return level;
            }

            current_price * 1.03
        }
        Direction::Bearish => {
            let swing = swing_points
                .iter()
                .filter(|p| p.direction == Direction::Bearish && p.level.0 < current_price)
                .map(|p| p.level.0)
                .max_by(|a, b| a.total_cmp(b));
            if let Some(level) = swing {
                return level;
            }

            let opposing = active_pois
                .iter()
                .filter(|(_, p)| p.direction == Direction::Bullish && p.top.0 < current_price)
                .map(|(_, p)| p.top.0)
                .max_by(|a, b| a.total_cmp(b));
            if let Some(level) = opposing {
                return level;
            }

            current_price * 0.97
        }
    }
}

/// Evaluate exits for a POSITIONED/MANAGING record on the current bar.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_exit(
    state: &PoiStateRecord,
    candle_high: f64,
    candle_low: f64,
    candle_close: f64,
    bar_index: usize,
    timestamp: DateTime<Utc>,
    fta: Option<&Fta>,
    structure: &[StructureEvent],
    config: &StrategyConfig,
    commission_pct: f64,
) -> Option<Signal> {
    if !matches!(state.phase, PoiPhase::Positioned | PoiPhase::Managing) {
        return None;
    }
    let (Some(entry_price), Some(stop_loss), Some(target)) =
        (state.entry_price, state.stop_loss, state.target)
    else {
        return None;
    };

    let direction = state.poi.direction;

    // 1. Stop-loss, checked before the target: a bar spanning both exits
    //    at the stop.
    if check_stop_loss_hit(candle_high, candle_low, stop_loss, direction) {
        let mut signal = Signal::new(
            SignalKind::Exit,
            state.poi_id.clone(),
            direction,
            timestamp,
            stop_loss,
        )
        .with_reason(ExitReason::StopLossHit.to_string());
        signal.metadata.insert("bar_index".into(), json!(bar_index));
        return Some(signal);
    }

    // 2. Target.
    if check_target_hit(candle_high, candle_low, target, direction) {
        let mut signal = Signal::new(
            SignalKind::Exit,
            state.poi_id.clone(),
            direction,
            timestamp,
            target,
        )
        .with_reason(ExitReason::TargetHit.to_string());
        signal.metadata.insert("bar_index".into(), json!(bar_index));
        return Some(signal);
    }

    // 3. Structural break-even: a break in the trade direction on this bar.
    if config.breakeven.structural_bu && state.breakeven_level.is_none() {
        let broke_this_bar = structure
            .iter()
            .any(|e| e.broken_index == bar_index && e.direction == direction);
        if broke_this_bar {
            let level = breakeven_level(entry_price, direction, commission_pct);
            let mut signal = Signal::new(
                SignalKind::MoveToBe,
                state.poi_id.clone(),
                direction,
                timestamp,
                level,
            )
            .with_reason("structural breakeven");
            signal.metadata.insert("bar_index".into(), json!(bar_index));
            signal.metadata.insert("be_level".into(), json!(level));
            return Some(signal);
        }
    }

    // 4. FTA break-even: price pushed past the trouble-area midpoint.
    if config.breakeven.fta_bu && state.breakeven_level.is_none() {
        if let Some(fta) = fta {
            let past_midpoint = match direction {
                Direction::Bullish => candle_close >= fta.midpoint,
                Direction::Bearish => candle_close <= fta.midpoint,
            };
            if past_midpoint {
                let level = breakeven_level(entry_price, direction, commission_pct);
                let mut signal = Signal::new(
                    SignalKind::MoveToBe,
                    state.poi_id.clone(),
                    direction,
                    timestamp,
                    level,
                )
                .with_reason("FTA breakeven");
                signal.metadata.insert("bar_index".into(), json!(bar_index));
                signal.metadata.insert("be_level".into(), json!(level));
                return Some(signal);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        concepts::{
            poi::{ComponentKind, Freshness, PoiComponent, PoiStatus},
            structure::StructureKind,
            swings::SwingStatus,
        },
        data::domain::Price,
    };
    use chrono::TimeZone;
    use smallvec::smallvec;

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(minute * 60, 0).unwrap()
    }

    fn demand_poi() -> Poi {
        Poi {
            direction: Direction::Bullish,
            top: Price(108.0),
            bottom: Price(100.0),
            midpoint: Price(104.0),
            score: 5.0,
            components: smallvec![PoiComponent {
                kind: ComponentKind::FvgHtf,
                source_index: 0,
                freshness: Freshness::Fresh,
            }],
            status: PoiStatus::Active,
            creation_time: ts(0),
        }
    }

    fn positioned_state() -> PoiStateRecord {
        PoiStateRecord {
            poi_id: "15m_1_0".to_string(),
            poi: demand_poi(),
            timeframe: Timeframe::M15,
            phase: PoiPhase::Positioned,
            confirmations: Vec::new(),
            entry_price: Some(109.0),
            stop_loss: Some(99.0),
            target: Some(130.0),
            breakeven_level: None,
            created_at: ts(0),
            last_updated: ts(0),
        }
    }

    fn evaluate(
        state: &PoiStateRecord,
        high: f64,
        low: f64,
        close: f64,
        structure: &[StructureEvent],
        fta: Option<&Fta>,
    ) -> Option<Signal> {
        evaluate_exit(
            state,
            high,
            low,
            close,
            50,
            ts(50),
            fta,
            structure,
            &StrategyConfig::default(),
            0.0006,
        )
    }

    fn swing(direction: Direction, level: f64) -> SwingPoint {
        SwingPoint {
            index: 10,
            direction,
            level: Price(level),
            status: SwingStatus::Active,
        }
    }

    #[test]
    fn stop_hit_exits_at_the_stop_price() {
        let state = positioned_state();
        let signal = evaluate(&state, 110.0, 98.5, 105.0, &[], None).expect("exit expected");
        assert_eq!(signal.kind, SignalKind::Exit);
        assert_eq!(signal.price, 99.0, "exit at the stop, not the low");
        assert_eq!(signal.reason, ExitReason::StopLossHit.to_string());
    }

    #[test]
    fn target_hit_exits_at_the_target_price() {
        let state = positioned_state();
        let signal = evaluate(&state, 130.5, 120.0, 129.0, &[], None).expect("exit expected");
        assert_eq!(signal.reason, ExitReason::TargetHit.to_string());
        assert_eq!(signal.price, 130.0);
    }

    #[test]
    fn stop_beats_target_when_a_bar_spans_both() {
        let state = positioned_state();
        let signal = evaluate(&state, 131.0, 98.0, 120.0, &[], None).expect("exit expected");
        assert_eq!(
            signal.reason,
            ExitReason::StopLossHit.to_string(),
            "stop is checked before target"
        );
    }

    #[test]
    fn structural_breakeven_fires_once() {
        let state = positioned_state();
        let events = [StructureEvent {
            kind: StructureKind::Cbos,
            direction: Direction::Bullish,
            broken_level: Price(112.0),
            broken_index: 50,
            swing_index: 45,
        }];

        let signal = evaluate(&state, 115.0, 110.0, 114.0, &events, None).expect("BE expected");
        assert_eq!(signal.kind, SignalKind::MoveToBe);
        let expected_level = 109.0 * (1.0 + 2.0 * 0.0006);
        assert!((signal.price - expected_level).abs() < 1e-9);

        // Once the BE level is set, the same event no longer triggers.
        let mut managing = positioned_state();
        managing.phase = PoiPhase::Managing;
        managing.breakeven_level = Some(expected_level);
        managing.stop_loss = Some(expected_level);
        let repeat = evaluate(&managing, 115.0, 110.0, 114.0, &events, None);
        assert!(repeat.is_none(), "no second BE move");
    }

    #[test]
    fn opposing_structure_does_not_move_be() {
        let state = positioned_state();
        let events = [StructureEvent {
            kind: StructureKind::Bos,
            direction: Direction::Bearish,
            broken_level: Price(104.0),
            broken_index: 50,
            swing_index: 45,
        }];
        assert!(evaluate(&state, 115.0, 110.0, 114.0, &events, None).is_none());
    }

    #[test]
    fn fta_breakeven_when_price_passes_the_midpoint() {
        let state = positioned_state();
        let fta = Fta {
            direction: Direction::Bearish,
            top: 122.0,
            bottom: 118.0,
            midpoint: 120.0,
            score: 3.0,
        };

        let before = evaluate(&state, 119.5, 112.0, 119.0, &[], Some(&fta));
        assert!(before.is_none(), "close below the FTA midpoint");

        let after = evaluate(&state, 121.0, 115.0, 120.5, &[], Some(&fta)).expect("BE expected");
        assert_eq!(after.kind, SignalKind::MoveToBe);
        assert_eq!(after.reason, "FTA breakeven");
    }

    #[test]
    fn non_positioned_phases_never_exit() {
        let mut state = positioned_state();
        state.phase = PoiPhase::Ready;
        assert!(evaluate(&state, 131.0, 98.0, 120.0, &[], None).is_none());
    }

    #[test]
    fn target_selection_prefers_swings_then_pois_then_percent() {
        let supply = Poi {
            direction: Direction::Bearish,
            top: Price(122.0),
            bottom: Price(118.0),
            midpoint: Price(120.0),
            ..demand_poi()
        };
        let pois = vec![(Timeframe::M15, &supply)];
        let swings = [
            swing(Direction::Bullish, 115.0),
            swing(Direction::Bullish, 112.0),
            swing(Direction::Bearish, 95.0),
        ];

        // Nearest same-side swing above price wins.
        let target = select_target(Direction::Bullish, 110.0, &pois, &swings);
        assert_eq!(target, 112.0);

        // No swings above price: the opposing POI's near edge.
        let target = select_target(Direction::Bullish, 116.0, &pois, &swings);
        assert_eq!(target, 118.0);

        // Nothing at all: 3% of price.
        let target = select_target(Direction::Bullish, 125.0, &[], &[]);
        assert!((target - 128.75).abs() < 1e-9);

        // Short mirror: nearest low below price.
        let target = select_target(Direction::Bearish, 100.0, &[], &swings);
        assert_eq!(target, 95.0);
        let target = select_target(Direction::Bearish, 100.0, &[], &[]);
        assert!((target - 97.0).abs() < 1e-9);
    }
}
