//! Position and equity management.
//!
//! The portfolio owns the cash balance, the open-position handles, and the
//! equity array; full trade records live in the [`TradeLog`]. Slippage
//! always works against the trader and commission is charged on both
//! fills at the moment they happen.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::{
    config::{BacktestConfig, RiskConfig},
    context::sync::SyncMode,
    data::domain::{Direction, Timeframe},
    engine::{
        events::{EventKind, EventLog},
        trade_log::{TradeEntry, TradeLog, TradeRecord},
    },
    error::ZonalResult,
    strategy::{ExitReason, Signal},
};

/// Lightweight handle to an open position; the journal holds the record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionHandle {
    pub trade_id: u64,
    pub direction: Direction,
    pub entry_price: f64,
    pub position_size: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub entry_bar_index: usize,
    pub is_addon: bool,
    pub parent_trade_id: Option<u64>,
}

/// Slippage always fills against the trader: entries pay up in the trade
/// direction, exits give back.
pub fn apply_slippage(price: f64, direction: Direction, is_entry: bool, slippage_pct: f64) -> f64 {
    let sign = if is_entry {
        direction.sign()
    } else {
        -direction.sign()
    };
    price * (1.0 + sign * slippage_pct)
}

#[derive(Debug)]
pub struct Portfolio {
    backtest: BacktestConfig,
    risk: RiskConfig,
    trade_log: TradeLog,

    cash: f64,
    /// Open positions per POI id; deterministic iteration order.
    positions: BTreeMap<String, Vec<PositionHandle>>,
    /// NaN before the first mark-to-market of each bar index.
    equity_curve: Vec<f64>,
    /// Last marked close; a position marks at its entry fill until the
    /// first mark-to-market after it opened.
    last_close: Option<f64>,
}

impl Portfolio {
    pub fn new(backtest: BacktestConfig, risk: RiskConfig, n_bars: usize) -> Self {
        let cash = backtest.initial_capital;
        Self {
            backtest,
            risk,
            trade_log: TradeLog::new(),
            cash,
            positions: BTreeMap::new(),
            equity_curve: vec![f64::NAN; n_bars],
            last_close: None,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// `cash + sum(direction x (last_close - entry) x size)` over all open
    /// positions.
    pub fn equity(&self) -> f64 {
        let mut unrealized = 0.0;
        for handles in self.positions.values() {
            for pos in handles {
                let mark = self.last_close.unwrap_or(pos.entry_price);
                unrealized += pos.direction.sign() * (mark - pos.entry_price) * pos.position_size;
            }
        }
        self.cash + unrealized
    }

    /// Count of distinct POI ids with open positions.
    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn can_open_position(&self) -> bool {
        self.open_position_count() < self.risk.max_concurrent_positions
    }

    pub fn has_position_for(&self, poi_id: &str) -> bool {
        self.positions.get(poi_id).is_some_and(|v| !v.is_empty())
    }

    pub fn positions_for(&self, poi_id: &str) -> &[PositionHandle] {
        self.positions.get(poi_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn open_poi_ids(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn trade_log(&self) -> &TradeLog {
        &self.trade_log
    }

    /// Execute an ENTER or ADD_ON signal. Returns the trade id, or `None`
    /// on rejection (position cap for new POI ids, or zero size); every
    /// rejection emits a POSITION_REJECTED event.
    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &mut self,
        signal: &Signal,
        sync_mode: SyncMode,
        bar_index: usize,
        timeframe: Option<Timeframe>,
        confirmation_count: usize,
        is_addon: bool,
        parent_trade_id: Option<u64>,
        events: &mut EventLog,
    ) -> Option<u64> {
        // Add-ons ride an existing POI id and bypass the cap.
        if !is_addon && !self.positions.contains_key(&signal.poi_id) && !self.can_open_position() {
            let mut details = serde_json::Map::new();
            details.insert("reason".into(), json!("max_positions_reached"));
            events.emit(
                EventKind::PositionRejected,
                signal.timestamp,
                signal.poi_id.clone(),
                details,
            );
            return None;
        }

        let fill_price = apply_slippage(
            signal.price,
            signal.direction,
            true,
            self.backtest.slippage_pct,
        );

        // `risk_amount / distance` scaled by the signal's multiplier: the
        // sync multiplier for entries, the add-on factor for add-ons.
        let risk_amount = self.equity() * self.risk.max_risk_per_trade;
        let distance = (fill_price - signal.stop_loss).abs();
        let size = if distance == 0.0 {
            0.0
        } else {
            (risk_amount / distance) * signal.size_multiplier
        };

        if size <= 0.0 || !size.is_finite() {
            let mut details = serde_json::Map::new();
            details.insert("reason".into(), json!("zero_position_size"));
            events.emit(
                EventKind::PositionRejected,
                signal.timestamp,
                signal.poi_id.clone(),
                details,
            );
            return None;
        }

        let commission = fill_price * size * self.backtest.commission_pct;
        self.cash -= commission;

        let trade_id = self.trade_log.open_trade(TradeEntry {
            poi_id: signal.poi_id.clone(),
            direction: signal.direction,
            entry_time: signal.timestamp,
            entry_price: fill_price,
            entry_signal_price: signal.price,
            position_size: size,
            stop_loss: signal.stop_loss,
            target: signal.target,
            commission,
            sync_mode,
            timeframe,
            confirmation_count,
            is_addon,
            parent_trade_id,
            metadata: signal.metadata.clone(),
        });

        self.positions
            .entry(signal.poi_id.clone())
            .or_default()
            .push(PositionHandle {
                trade_id,
                direction: signal.direction,
                entry_price: fill_price,
                position_size: size,
                stop_loss: signal.stop_loss,
                target: signal.target,
                entry_bar_index: bar_index,
                is_addon,
                parent_trade_id,
            });

        let mut details = serde_json::Map::new();
        details.insert("trade_id".into(), json!(trade_id));
        details.insert("fill_price".into(), json!(fill_price));
        details.insert("size".into(), json!(size));
        let kind = if is_addon {
            EventKind::Addon
        } else {
            EventKind::Entry
        };
        events.emit(kind, signal.timestamp, signal.poi_id.clone(), details);

        Some(trade_id)
    }

    /// Close every position for `poi_id` at the signal price, after
    /// slippage. Returns the closed trade ids.
    pub fn close_position(
        &mut self,
        poi_id: &str,
        exit_signal_price: f64,
        exit_reason: ExitReason,
        timestamp: DateTime<Utc>,
        bar_index: usize,
        events: &mut EventLog,
    ) -> ZonalResult<Vec<u64>> {
        let Some(handles) = self.positions.remove(poi_id) else {
            return Ok(Vec::new());
        };

        let mut closed = Vec::with_capacity(handles.len());
        for pos in handles {
            let fill_price = apply_slippage(
                exit_signal_price,
                pos.direction,
                false,
                self.backtest.slippage_pct,
            );

            let commission = fill_price * pos.position_size * self.backtest.commission_pct;
            let proceeds =
                pos.direction.sign() * (fill_price - pos.entry_price) * pos.position_size;
            self.cash += proceeds - commission;

            self.trade_log.close_trade(
                pos.trade_id,
                timestamp,
                fill_price,
                exit_signal_price,
                exit_reason,
                commission,
                bar_index - pos.entry_bar_index,
            )?;
            closed.push(pos.trade_id);
        }

        let mut details = serde_json::Map::new();
        details.insert("exit_reason".into(), json!(exit_reason.to_string()));
        details.insert("n_closed".into(), json!(closed.len()));
        events.emit(EventKind::Exit, timestamp, poi_id.to_string(), details);

        Ok(closed)
    }

    /// Rewrite the stop on every open position of a POI (BE moves).
    pub fn modify_stop_loss(&mut self, poi_id: &str, new_stop: f64) -> ZonalResult<()> {
        if let Some(handles) = self.positions.get_mut(poi_id) {
            for pos in handles {
                pos.stop_loss = new_stop;
                self.trade_log.update_stop(pos.trade_id, new_stop)?;
            }
        }
        Ok(())
    }

    /// Once per bar after entries and exits: record equity and update the
    /// excursions of every open position.
    pub fn mark_to_market(
        &mut self,
        bar_index: usize,
        bar_high: f64,
        bar_low: f64,
        bar_close: f64,
    ) -> ZonalResult<()> {
        self.last_close = Some(bar_close);

        for handles in self.positions.values() {
            for pos in handles {
                self.trade_log
                    .update_excursion(pos.trade_id, bar_high, bar_low)?;
            }
        }

        if let Some(slot) = self.equity_curve.get_mut(bar_index) {
            *slot = self.cash
                + self
                    .positions
                    .values()
                    .flatten()
                    .map(|pos| {
                        pos.direction.sign() * (bar_close - pos.entry_price) * pos.position_size
                    })
                    .sum::<f64>();
        }
        Ok(())
    }

    pub fn equity_curve(&self) -> &[f64] {
        &self.equity_curve
    }

    pub fn into_parts(self) -> (Vec<TradeRecord>, Vec<f64>) {
        (self.trade_log.into_trades(), self.equity_curve)
    }
}
