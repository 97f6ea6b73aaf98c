//! Trade journal: the complete record of every trade from entry to exit.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    context::sync::SyncMode,
    data::domain::{Direction, Timeframe},
    error::{EngineError, ZonalResult},
    strategy::ExitReason,
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
pub enum TradeOutcome {
    Win,
    Loss,
    Breakeven,
}

/// WIN/LOSS/BREAKEVEN at the two-commission threshold: a realized P&L
/// within twice the total commission is noise, not an edge.
pub fn classify_outcome(realized_pnl: f64, commission_total: f64) -> TradeOutcome {
    let threshold = if commission_total <= 0.0 {
        0.01
    } else {
        commission_total
    };
    if realized_pnl.abs() <= 2.0 * threshold {
        TradeOutcome::Breakeven
    } else if realized_pnl > 0.0 {
        TradeOutcome::Win
    } else {
        TradeOutcome::Loss
    }
}

/// Realized price move in the trade direction, per unit of initial risk.
pub fn r_multiple(entry_price: f64, exit_price: f64, stop_loss: f64, direction: Direction) -> f64 {
    let (risk, reward) = match direction {
        Direction::Bullish => (entry_price - stop_loss, exit_price - entry_price),
        Direction::Bearish => (stop_loss - entry_price, entry_price - exit_price),
    };
    if risk <= 0.0 {
        return 0.0;
    }
    reward / risk
}

/// One trade, entry through exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: u64,
    pub poi_id: String,
    pub direction: Direction,

    // Entry
    pub entry_time: DateTime<Utc>,
    /// Fill after slippage.
    pub entry_price: f64,
    /// Signal price before slippage.
    pub entry_signal_price: f64,
    pub position_size: f64,

    // Exit, filled when the trade closes.
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub exit_signal_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,

    // P&L
    pub gross_pnl: f64,
    pub realized_pnl: f64,
    pub commission_entry: f64,
    pub commission_exit: f64,

    // Excursions, updated bar-by-bar while open; never decrease.
    pub max_favorable_excursion: f64,
    pub max_adverse_excursion: f64,

    // Context
    pub sync_mode: SyncMode,
    pub timeframe: Option<Timeframe>,
    pub confirmation_count: usize,
    pub stop_loss: f64,
    pub target: f64,
    pub is_addon: bool,
    pub parent_trade_id: Option<u64>,

    // Classification, set on close.
    pub outcome: Option<TradeOutcome>,
    pub r_multiple: f64,
    pub duration_bars: usize,
    pub metadata: Map<String, Value>,
}

impl TradeRecord {
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    pub fn total_commission(&self) -> f64 {
        self.commission_entry + self.commission_exit
    }
}

/// Parameters for opening a trade.
#[derive(Debug, Clone)]
pub struct TradeEntry {
    pub poi_id: String,
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_signal_price: f64,
    pub position_size: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub commission: f64,
    pub sync_mode: SyncMode,
    pub timeframe: Option<Timeframe>,
    pub confirmation_count: usize,
    pub is_addon: bool,
    pub parent_trade_id: Option<u64>,
    pub metadata: Map<String, Value>,
}

/// Accumulates trade records over a run. Owns them exclusively; the
/// portfolio only keeps handles by trade id.
#[derive(Debug, Default)]
pub struct TradeLog {
    trades: Vec<TradeRecord>,
    open_ids: BTreeSet<u64>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trade opening; returns the assigned trade id.
    pub fn open_trade(&mut self, entry: TradeEntry) -> u64 {
        let trade_id = self.trades.len() as u64;
        self.trades.push(TradeRecord {
            trade_id,
            poi_id: entry.poi_id,
            direction: entry.direction,
            entry_time: entry.entry_time,
            entry_price: entry.entry_price,
            entry_signal_price: entry.entry_signal_price,
            position_size: entry.position_size,
            exit_time: None,
            exit_price: None,
            exit_signal_price: None,
            exit_reason: None,
            gross_pnl: 0.0,
            realized_pnl: 0.0,
            commission_entry: entry.commission,
            commission_exit: 0.0,
            max_favorable_excursion: 0.0,
            max_adverse_excursion: 0.0,
            sync_mode: entry.sync_mode,
            timeframe: entry.timeframe,
            confirmation_count: entry.confirmation_count,
            stop_loss: entry.stop_loss,
            target: entry.target,
            is_addon: entry.is_addon,
            parent_trade_id: entry.parent_trade_id,
            outcome: None,
            r_multiple: 0.0,
            duration_bars: 0,
            metadata: entry.metadata,
        });
        self.open_ids.insert(trade_id);
        trade_id
    }

    /// Fill the exit side, compute P&L, and classify the outcome.
    #[allow(clippy::too_many_arguments)]
    pub fn close_trade(
        &mut self,
        trade_id: u64,
        exit_time: DateTime<Utc>,
        exit_price: f64,
        exit_signal_price: f64,
        exit_reason: ExitReason,
        commission: f64,
        duration_bars: usize,
    ) -> ZonalResult<&TradeRecord> {
        let record = self
            .trades
            .get_mut(trade_id as usize)
            .ok_or(EngineError::UnknownTrade(trade_id))?;

        record.exit_time = Some(exit_time);
        record.exit_price = Some(exit_price);
        record.exit_signal_price = Some(exit_signal_price);
        record.exit_reason = Some(exit_reason);
        record.commission_exit = commission;
        record.duration_bars = duration_bars;

        record.gross_pnl =
            record.direction.sign() * (exit_price - record.entry_price) * record.position_size;
        let total_commission = record.commission_entry + record.commission_exit;
        record.realized_pnl = record.gross_pnl - total_commission;

        record.outcome = Some(classify_outcome(record.realized_pnl, total_commission));
        record.r_multiple = r_multiple(
            record.entry_price,
            exit_price,
            record.stop_loss,
            record.direction,
        );

        self.open_ids.remove(&trade_id);
        Ok(&self.trades[trade_id as usize])
    }

    /// Update MFE/MAE for an open trade from the current bar's range.
    pub fn update_excursion(
        &mut self,
        trade_id: u64,
        bar_high: f64,
        bar_low: f64,
    ) -> ZonalResult<()> {
        let record = self
            .trades
            .get_mut(trade_id as usize)
            .ok_or(EngineError::UnknownTrade(trade_id))?;

        let (favorable, adverse) = match record.direction {
            Direction::Bullish => (bar_high - record.entry_price, record.entry_price - bar_low),
            Direction::Bearish => (record.entry_price - bar_low, bar_high - record.entry_price),
        };

        if favorable > record.max_favorable_excursion {
            record.max_favorable_excursion = favorable;
        }
        if adverse > record.max_adverse_excursion {
            record.max_adverse_excursion = adverse;
        }
        Ok(())
    }

    /// Update the stop recorded for an open trade (BE/SL moves).
    pub fn update_stop(&mut self, trade_id: u64, new_stop: f64) -> ZonalResult<()> {
        let record = self
            .trades
            .get_mut(trade_id as usize)
            .ok_or(EngineError::UnknownTrade(trade_id))?;
        record.stop_loss = new_stop;
        Ok(())
    }

    pub fn trade(&self, trade_id: u64) -> ZonalResult<&TradeRecord> {
        self.trades
            .get(trade_id as usize)
            .ok_or_else(|| EngineError::UnknownTrade(trade_id).into())
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn open_trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.open_ids.iter().map(|&id| &self.trades[id as usize])
    }

    pub fn into_trades(self) -> Vec<TradeRecord> {
        self.trades
    }
}
