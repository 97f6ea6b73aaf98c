//! Trade-journal and event-log export.
//!
//! The journal renders to a polars `DataFrame` (one row per trade, column
//! order per the trade-record schema) and writes CSV through `CsvWriter`.

use std::fs::File;
use std::path::Path;

use polars::prelude::*;

use crate::{
    engine::{events::Event, trade_log::TradeRecord},
    error::{ReportError, ZonalResult},
};

fn to_polars_err(e: PolarsError) -> ReportError {
    ReportError::DataFrame(e.to_string())
}

/// One row per trade; open trades carry nulls in the exit columns.
pub fn trades_to_dataframe(trades: &[TradeRecord]) -> ZonalResult<DataFrame> {
    let trade_ids: Vec<u64> = trades.iter().map(|t| t.trade_id).collect();
    let poi_ids: Vec<String> = trades.iter().map(|t| t.poi_id.clone()).collect();
    let directions: Vec<String> = trades.iter().map(|t| t.direction.to_string()).collect();
    let entry_times: Vec<String> = trades.iter().map(|t| t.entry_time.to_rfc3339()).collect();
    let entry_signal_prices: Vec<f64> = trades.iter().map(|t| t.entry_signal_price).collect();
    let entry_prices: Vec<f64> = trades.iter().map(|t| t.entry_price).collect();
    let position_sizes: Vec<f64> = trades.iter().map(|t| t.position_size).collect();
    let stop_losses: Vec<f64> = trades.iter().map(|t| t.stop_loss).collect();
    let targets: Vec<f64> = trades.iter().map(|t| t.target).collect();
    let exit_times: Vec<Option<String>> = trades
        .iter()
        .map(|t| t.exit_time.map(|ts| ts.to_rfc3339()))
        .collect();
    let exit_signal_prices: Vec<Option<f64>> =
        trades.iter().map(|t| t.exit_signal_price).collect();
    let exit_prices: Vec<Option<f64>> = trades.iter().map(|t| t.exit_price).collect();
    let exit_reasons: Vec<Option<String>> = trades
        .iter()
        .map(|t| t.exit_reason.map(|r| r.to_string()))
        .collect();
    let commission_entries: Vec<f64> = trades.iter().map(|t| t.commission_entry).collect();
    let commission_exits: Vec<f64> = trades.iter().map(|t| t.commission_exit).collect();
    let gross_pnls: Vec<f64> = trades.iter().map(|t| t.gross_pnl).collect();
    let realized_pnls: Vec<f64> = trades.iter().map(|t| t.realized_pnl).collect();
    let mfes: Vec<f64> = trades.iter().map(|t| t.max_favorable_excursion).collect();
    let maes: Vec<f64> = trades.iter().map(|t| t.max_adverse_excursion).collect();
    let is_addons: Vec<bool> = trades.iter().map(|t| t.is_addon).collect();
    let parent_trade_ids: Vec<Option<u64>> =
        trades.iter().map(|t| t.parent_trade_id).collect();
    let sync_modes: Vec<String> = trades.iter().map(|t| t.sync_mode.to_string()).collect();
    let timeframes: Vec<Option<String>> = trades
        .iter()
        .map(|t| t.timeframe.map(|tf| tf.to_string()))
        .collect();
    let confirmation_counts: Vec<u64> =
        trades.iter().map(|t| t.confirmation_count as u64).collect();
    let outcomes: Vec<Option<String>> = trades
        .iter()
        .map(|t| t.outcome.map(|o| o.to_string()))
        .collect();
    let r_multiples: Vec<f64> = trades.iter().map(|t| t.r_multiple).collect();
    let duration_bars: Vec<u64> = trades.iter().map(|t| t.duration_bars as u64).collect();

    let df = df!(
        "trade_id" => trade_ids,
        "poi_id" => poi_ids,
        "direction" => directions,
        "entry_time" => entry_times,
        "entry_signal_price" => entry_signal_prices,
        "entry_price" => entry_prices,
        "position_size" => position_sizes,
        "stop_loss" => stop_losses,
        "target" => targets,
        "exit_time" => exit_times,
        "exit_signal_price" => exit_signal_prices,
        "exit_price" => exit_prices,
        "exit_reason" => exit_reasons,
        "commission_entry" => commission_entries,
        "commission_exit" => commission_exits,
        "gross_pnl" => gross_pnls,
        "realized_pnl" => realized_pnls,
        "max_favorable_excursion" => mfes,
        "max_adverse_excursion" => maes,
        "is_addon" => is_addons,
        "parent_trade_id" => parent_trade_ids,
        "sync_mode" => sync_modes,
        "timeframe" => timeframes,
        "confirmation_count" => confirmation_counts,
        "outcome" => outcomes,
        "r_multiple" => r_multiples,
        "duration_bars" => duration_bars,
    )
    .map_err(to_polars_err)?;

    Ok(df)
}

/// Write the trade journal as CSV, one row per trade.
pub fn write_trades_csv(trades: &[TradeRecord], path: &Path) -> ZonalResult<()> {
    let mut df = trades_to_dataframe(trades)?;
    let mut file = File::create(path).map_err(ReportError::Io)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .map_err(to_polars_err)?;
    tracing::info!(path = %path.display(), rows = trades.len(), "trade journal written");
    Ok(())
}

/// One row per event, with the detail map flattened to JSON.
pub fn events_to_dataframe(events: &[Event]) -> ZonalResult<DataFrame> {
    let kinds: Vec<String> = events.iter().map(|e| e.kind.to_string()).collect();
    let timestamps: Vec<String> = events.iter().map(|e| e.timestamp.to_rfc3339()).collect();
    let poi_ids: Vec<String> = events.iter().map(|e| e.poi_id.clone()).collect();
    let details: Vec<String> = events
        .iter()
        .map(|e| serde_json::Value::Object(e.details.clone()).to_string())
        .collect();

    df!(
        "kind" => kinds,
        "timestamp" => timestamps,
        "poi_id" => poi_ids,
        "details" => details,
    )
    .map_err(|e| to_polars_err(e).into())
}
