//! Entry decisions for READY POIs.
//!
//! Decision tree: a close FTA vetoes; a 5th-confirm trap waits for a
//! return-to-FVG test when configured; conservative mode needs the close
//! out of the zone, aggressive enters immediately. The candidate is then
//! risk-validated against a rough 3x target before the signal is built.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::{
    concepts::{fvg::Fvg, liquidity::LiquidityLevel},
    config::{EntryMode, StrategyConfig},
    context::{
        machine::{PoiPhase, PoiStateRecord},
        sync::{SyncMode, position_size_multiplier},
    },
    data::{candle::Candle, domain::Direction},
    strategy::{
        Signal, SignalKind,
        confirmations::has_fifth_confirm_trap,
        fta::{FtaDistance, permits_entry},
        risk::{calculate_stop_loss, validate_risk},
    },
};

const MIN_REWARD_TO_RISK: f64 = 2.0;
const ROUGH_TARGET_MULTIPLE: f64 = 3.0;

/// Conservative entry: the close has left the zone in the trade direction.
pub fn check_conservative_entry(state: &PoiStateRecord, candle: &Candle) -> bool {
    match state.poi.direction {
        Direction::Bullish => candle.close.0 > state.poi.top.0,
        Direction::Bearish => candle.close.0 < state.poi.bottom.0,
    }
}

/// RTO entry: price has returned to test an active same-direction FVG.
pub fn check_rto_entry(state: &PoiStateRecord, candle: &Candle, nearby_fvgs: &[Fvg]) -> bool {
    let direction = state.poi.direction;
    nearby_fvgs
        .iter()
        .filter(|f| f.status.is_active() && f.direction == direction)
        .any(|f| match direction {
            Direction::Bullish => candle.low.0 <= f.top.0,
            Direction::Bearish => candle.high.0 >= f.bottom.0,
        })
}

/// Evaluate an entry for a READY record. Returns `None` when any gate
/// (phase, FTA, trap, mode, risk) blocks.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_entry(
    state: &PoiStateRecord,
    candle: &Candle,
    bar_index: usize,
    timestamp: DateTime<Utc>,
    fta_classification: Option<FtaDistance>,
    sync_mode: SyncMode,
    nearby_fvgs: &[Fvg],
    nearby_liquidity: &[&LiquidityLevel],
    config: &StrategyConfig,
) -> Option<Signal> {
    if state.phase != PoiPhase::Ready {
        return None;
    }

    if !permits_entry(fta_classification) {
        return None;
    }

    if has_fifth_confirm_trap(&state.confirmations) && config.entry.rto_wait {
        return if check_rto_entry(state, candle, nearby_fvgs) {
            build_entry_signal(
                state,
                candle,
                bar_index,
                timestamp,
                sync_mode,
                nearby_fvgs,
                nearby_liquidity,
                config,
                "RTO entry after 5th-confirm trap",
            )
        } else {
            None
        };
    }

    let triggered = match config.entry.mode {
        EntryMode::Conservative => check_conservative_entry(state, candle),
        EntryMode::Aggressive => true,
    };
    if !triggered {
        return None;
    }

    let reason = match config.entry.mode {
        EntryMode::Conservative => "conservative entry",
        EntryMode::Aggressive => "aggressive entry",
    };
    build_entry_signal(
        state,
        candle,
        bar_index,
        timestamp,
        sync_mode,
        nearby_fvgs,
        nearby_liquidity,
        config,
        reason,
    )
}

/// Assemble the signal: stop placement, a rough 3x target for the R/R
/// floor, and the sync-mode size multiplier.
#[allow(clippy::too_many_arguments)]
fn build_entry_signal(
    state: &PoiStateRecord,
    candle: &Candle,
    bar_index: usize,
    timestamp: DateTime<Utc>,
    sync_mode: SyncMode,
    nearby_fvgs: &[Fvg],
    nearby_liquidity: &[&LiquidityLevel],
    config: &StrategyConfig,
    reason: &str,
) -> Option<Signal> {
    let direction = state.poi.direction;
    let entry_price = candle.close.0;

    let stop_loss = calculate_stop_loss(
        &state.poi,
        direction,
        nearby_fvgs,
        nearby_liquidity,
        &config.risk.stop_loss_method,
    );

    let stop_distance = (entry_price - stop_loss).abs();
    let rough_target = match direction {
        Direction::Bullish => entry_price + stop_distance * ROUGH_TARGET_MULTIPLE,
        Direction::Bearish => entry_price - stop_distance * ROUGH_TARGET_MULTIPLE,
    };

    let (is_valid, rr) = validate_risk(
        entry_price,
        stop_loss,
        rough_target,
        direction,
        MIN_REWARD_TO_RISK,
    );
    if !is_valid {
        return None;
    }

    let mut signal = Signal::new(
        SignalKind::Enter,
        state.poi_id.clone(),
        direction,
        timestamp,
        entry_price,
    )
    .with_stop_loss(stop_loss)
    .with_target(rough_target)
    .with_size_multiplier(position_size_multiplier(sync_mode, &config.risk))
    .with_reason(reason);

    signal.metadata.insert("bar_index".into(), json!(bar_index));
    signal
        .metadata
        .insert("sync_mode".into(), json!(sync_mode.to_string()));
    signal.metadata.insert("rr".into(), json!(rr));
    signal.metadata.insert(
        "confirmation_count".into(),
        json!(state.confirmations.len()),
    );
    Some(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        concepts::{
            fvg::FvgStatus,
            poi::{ComponentKind, Freshness, Poi, PoiComponent, PoiStatus},
        },
        data::domain::{Price, Timeframe},
        strategy::confirmations::{Confirmation, ConfirmationKind},
    };
    use chrono::TimeZone;
    use serde_json::Map;
    use smallvec::smallvec;

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(minute * 60, 0).unwrap()
    }

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: ts(10),
            open: Price(open),
            high: Price(high),
            low: Price(low),
            close: Price(close),
            volume: 1,
        }
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

    fn confirmation(kind: ConfirmationKind, bar_index: usize) -> Confirmation {
        Confirmation {
            kind,
            timestamp: ts(bar_index as i64),
            bar_index,
            details: Map::new(),
        }
    }

    fn ready_state() -> PoiStateRecord {
        PoiStateRecord {
            poi_id: "15m_1_0".to_string(),
            poi: demand_poi(),
            timeframe: Timeframe::M15,
            phase: PoiPhase::Ready,
            confirmations: vec![
                confirmation(ConfirmationKind::PoiTap, 1),
                confirmation(ConfirmationKind::LiquiditySweep, 2),
                confirmation(ConfirmationKind::PoiTap, 3),
                confirmation(ConfirmationKind::CvbTest, 4),
                confirmation(ConfirmationKind::InversionTest, 5),
            ],
            entry_price: None,
            stop_loss: None,
            target: None,
            breakeven_level: None,
            created_at: ts(0),
            last_updated: ts(5),
        }
    }

    fn evaluate(
        state: &PoiStateRecord,
        candle: &Candle,
        fta_class: Option<FtaDistance>,
        config: &StrategyConfig,
    ) -> Option<Signal> {
        evaluate_entry(
            state,
            candle,
            10,
            ts(10),
            fta_class,
            SyncMode::Sync,
            &[],
            &[],
            config,
        )
    }

    #[test]
    fn conservative_entry_needs_the_close_out_of_the_zone() {
        let state = ready_state();
        let config = StrategyConfig::default();

        // Close above the 108 zone top.
        let breaking = candle(107.0, 109.5, 106.5, 109.0);
        let signal = evaluate(&state, &breaking, None, &config).expect("entry expected");
        assert_eq!(signal.kind, SignalKind::Enter);
        assert_eq!(signal.price, 109.0, "enter at the close");
        assert_eq!(signal.size_multiplier, 1.0, "sync trades full size");
        assert!(signal.stop_loss < 100.0, "stop behind the zone");
        assert!(signal.target > signal.price, "long target above entry");

        // Close still inside the zone: no entry.
        let inside = candle(106.0, 107.5, 105.0, 107.0);
        assert!(evaluate(&state, &inside, None, &config).is_none());
    }

    #[test]
    fn aggressive_mode_enters_immediately() {
        let state = ready_state();
        let mut config = StrategyConfig::default();
        config.entry.mode = EntryMode::Aggressive;

        let inside = candle(106.0, 107.5, 105.0, 107.0);
        assert!(
            evaluate(&state, &inside, None, &config).is_some(),
            "aggressive mode does not wait for the zone exit"
        );
    }

    #[test]
    fn close_fta_blocks_every_entry() {
        let state = ready_state();
        let config = StrategyConfig::default();
        let breaking = candle(107.0, 109.5, 106.5, 109.0);

        assert!(evaluate(&state, &breaking, Some(FtaDistance::Close), &config).is_none());
        assert!(evaluate(&state, &breaking, Some(FtaDistance::Far), &config).is_some());
    }

    #[test]
    fn non_ready_phases_never_enter() {
        let mut state = ready_state();
        state.phase = PoiPhase::Collecting;
        let config = StrategyConfig::default();
        let breaking = candle(107.0, 109.5, 106.5, 109.0);
        assert!(evaluate(&state, &breaking, None, &config).is_none());
    }

    #[test]
    fn trap_waits_for_rto_when_configured() {
        let mut state = ready_state();
        // A trapped list: no FVG-related confirmations, structural last.
        state.confirmations = vec![
            confirmation(ConfirmationKind::PoiTap, 1),
            confirmation(ConfirmationKind::LiquiditySweep, 2),
            confirmation(ConfirmationKind::PoiTap, 3),
            confirmation(ConfirmationKind::CvbTest, 4),
            confirmation(ConfirmationKind::StructureBreak, 5),
        ];
        let config = StrategyConfig::default();
        assert!(config.entry.rto_wait, "default waits for RTO");

        // The close is out of the zone, but without an FVG retest the
        // trap holds the entry back.
        let breaking = candle(107.0, 109.5, 106.5, 109.0);
        assert!(evaluate(&state, &breaking, None, &config).is_none());

        // A bar that dips back into an active bullish FVG is the RTO.
        let fvgs = [Fvg {
            direction: Direction::Bullish,
            top: Price(107.0),
            bottom: Price(105.0),
            midpoint: Price(106.0),
            start_index: 0,
            creation_index: 2,
            status: FvgStatus::Fresh,
        }];
        let rto_bar = candle(108.0, 109.0, 106.5, 108.5);
        let signal = evaluate_entry(
            &state,
            &rto_bar,
            10,
            ts(10),
            None,
            SyncMode::Sync,
            &fvgs,
            &[],
            &config,
        )
        .expect("RTO entry expected");
        assert!(signal.reason.contains("RTO"));
    }

    #[test]
    fn trap_enters_anyway_when_rto_wait_is_off() {
        let mut state = ready_state();
        state.confirmations = vec![
            confirmation(ConfirmationKind::PoiTap, 1),
            confirmation(ConfirmationKind::LiquiditySweep, 2),
            confirmation(ConfirmationKind::PoiTap, 3),
            confirmation(ConfirmationKind::CvbTest, 4),
            confirmation(ConfirmationKind::StructureBreak, 5),
        ];
        let mut config = StrategyConfig::default();
        config.entry.rto_wait = false;

        let breaking = candle(107.0, 109.5, 106.5, 109.0);
        assert!(
            evaluate(&state, &breaking, None, &config).is_some(),
            "rto_wait off ignores the trap"
        );
    }

    #[test]
    fn undefined_sync_produces_a_zero_multiplier() {
        let state = ready_state();
        let config = StrategyConfig::default();
        let breaking = candle(107.0, 109.5, 106.5, 109.0);

        let signal = evaluate_entry(
            &state,
            &breaking,
            10,
            ts(10),
            None,
            SyncMode::Undefined,
            &[],
            &[],
            &config,
        )
        .expect("signal is still emitted");
        assert_eq!(
            signal.size_multiplier, 0.0,
            "the portfolio rejects it as zero size"
        );
    }

    #[test]
    fn rough_target_is_three_stop_distances() {
        let state = ready_state();
        let config = StrategyConfig::default();
        let breaking = candle(107.0, 109.5, 106.5, 109.0);

        let signal = evaluate(&state, &breaking, None, &config).expect("entry expected");
        let distance = signal.price - signal.stop_loss;
        assert!(
            (signal.target - (signal.price + 3.0 * distance)).abs() < 1e-9,
            "target = entry + 3x stop distance"
        );
        let rr = signal.metadata.get("rr").and_then(|v| v.as_f64()).unwrap();
        assert!(rr >= 2.0, "R/R floor holds");
    }
}
