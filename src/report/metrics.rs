//! Performance analytics over the equity curve and trade journal.
//!
//! All series are NaN-tolerant (slots before the first mark-to-market are
//! NaN) and every reduction is sequential, so identical inputs produce
//! bit-identical reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    context::sync::SyncMode,
    engine::trade_log::{TradeOutcome, TradeRecord},
};

/// Complete performance metrics for one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsReport {
    // Returns
    pub total_return_pct: f64,
    pub cagr_pct: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_duration_bars: usize,

    // Risk-adjusted
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,

    // Trade statistics
    pub trade_stats: TradeStats,

    // Per sync mode
    pub sync_stats: BTreeMap<SyncMode, TradeStats>,

    // Monthly breakdown
    pub monthly_returns: Vec<MonthlyReturn>,

    // Equity
    pub final_equity: f64,
    pub peak_equity: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub win_rate_pct: f64,
    pub avg_rr: f64,
    pub avg_win_rr: f64,
    pub avg_loss_rr: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub avg_trade_duration_bars: usize,
    pub avg_win_duration_bars: usize,
    pub avg_loss_duration_bars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    /// `YYYY-MM`.
    pub month: String,
    pub return_pct: f64,
    pub trade_count: usize,
}

/// Drawdown series over the non-NaN equity values, plus the deepest
/// drawdown and the longest streak below the running peak.
pub fn compute_drawdown(equity_curve: &[f64]) -> (Vec<f64>, f64, usize) {
    let valid: Vec<f64> = equity_curve.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.len() < 2 {
        return (Vec::new(), 0.0, 0);
    }

    let mut dd = Vec::with_capacity(valid.len());
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut current_duration = 0usize;

    for &value in &valid {
        if value > peak {
            peak = value;
        }
        let drawdown = if peak > 0.0 { (value - peak) / peak } else { 0.0 };
        dd.push(drawdown);
        if drawdown.abs() > max_dd {
            max_dd = drawdown.abs();
        }
        if value < peak {
            current_duration += 1;
            max_duration = max_duration.max(current_duration);
        } else {
            current_duration = 0;
        }
    }

    (dd, max_dd, max_duration)
}

fn bar_returns(equity_curve: &[f64]) -> Vec<f64> {
    let valid: Vec<f64> = equity_curve.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.len() < 2 {
        return Vec::new();
    }
    valid
        .windows(2)
        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (Bessel-corrected).
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Annualized Sharpe from bar-by-bar equity returns.
pub fn compute_sharpe(equity_curve: &[f64], bars_per_year: f64) -> f64 {
    let returns = bar_returns(equity_curve);
    let sd = std_dev(&returns);
    if sd == 0.0 {
        return 0.0;
    }
    mean(&returns) / sd * bars_per_year.sqrt()
}

/// Annualized Sortino: deviation over negative returns only.
pub fn compute_sortino(equity_curve: &[f64], bars_per_year: f64) -> f64 {
    let returns = bar_returns(equity_curve);
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let sd = std_dev(&downside);
    if sd == 0.0 {
        return 0.0;
    }
    mean(&returns) / sd * bars_per_year.sqrt()
}

pub fn compute_calmar(cagr_pct: f64, max_drawdown_pct: f64) -> f64 {
    if max_drawdown_pct == 0.0 {
        return 0.0;
    }
    cagr_pct / max_drawdown_pct
}

fn return_metrics(equity_curve: &[f64], initial_capital: f64, bars_per_year: f64) -> (f64, f64) {
    let valid: Vec<f64> = equity_curve.iter().copied().filter(|v| !v.is_nan()).collect();
    let Some(&final_equity) = valid.last() else {
        return (0.0, 0.0);
    };

    let total_return = (final_equity - initial_capital) / initial_capital * 100.0;

    let years = valid.len() as f64 / bars_per_year;
    let cagr = if years < 0.001 || initial_capital <= 0.0 || final_equity <= 0.0 {
        0.0
    } else {
        ((final_equity / initial_capital).powf(1.0 / years) - 1.0) * 100.0
    };

    (total_return, cagr)
}

/// Win rate, R averages, profit factor, expectancy, and durations over
/// the closed trades.
pub fn compute_trade_stats(trades: &[TradeRecord]) -> TradeStats {
    let closed: Vec<&TradeRecord> = trades.iter().filter(|t| t.outcome.is_some()).collect();
    if closed.is_empty() {
        return TradeStats::default();
    }

    let total = closed.len();
    let winners: Vec<&&TradeRecord> = closed
        .iter()
        .filter(|t| t.outcome == Some(TradeOutcome::Win))
        .collect();
    let losers: Vec<&&TradeRecord> = closed
        .iter()
        .filter(|t| t.outcome == Some(TradeOutcome::Loss))
        .collect();
    let breakevens = closed
        .iter()
        .filter(|t| t.outcome == Some(TradeOutcome::Breakeven))
        .count();

    let avg = |records: &[&&TradeRecord], f: fn(&TradeRecord) -> f64| -> f64 {
        if records.is_empty() {
            return 0.0;
        }
        records.iter().map(|t| f(t)).sum::<f64>() / records.len() as f64
    };

    let avg_rr = closed.iter().map(|t| t.r_multiple).sum::<f64>() / total as f64;
    let avg_win_rr = avg(&winners, |t| t.r_multiple);
    let avg_loss_rr = avg(&losers, |t| t.r_multiple);

    let gross_profit: f64 = winners.iter().map(|t| t.realized_pnl).sum();
    let gross_loss: f64 = losers.iter().map(|t| t.realized_pnl).sum::<f64>().abs();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        0.0
    };

    let win_rate = winners.len() as f64 / total as f64;
    let loss_rate = losers.len() as f64 / total as f64;
    // avg_loss_rr is negative, so this is the net R expectation per trade.
    let expectancy = win_rate * avg_win_rr + loss_rate * avg_loss_rr;

    let avg_duration = closed.iter().map(|t| t.duration_bars).sum::<usize>() / total;
    let avg_dur = |records: &[&&TradeRecord]| -> usize {
        if records.is_empty() {
            return 0;
        }
        records.iter().map(|t| t.duration_bars).sum::<usize>() / records.len()
    };

    TradeStats {
        total_trades: total,
        winning_trades: winners.len(),
        losing_trades: losers.len(),
        breakeven_trades: breakevens,
        win_rate_pct: win_rate * 100.0,
        avg_rr,
        avg_win_rr,
        avg_loss_rr,
        profit_factor,
        expectancy,
        avg_trade_duration_bars: avg_duration,
        avg_win_duration_bars: avg_dur(&winners),
        avg_loss_duration_bars: avg_dur(&losers),
    }
}

/// Replay the trade statistics on each sync-mode partition.
pub fn compute_sync_stats(trades: &[TradeRecord]) -> BTreeMap<SyncMode, TradeStats> {
    let mut partitions: BTreeMap<SyncMode, Vec<TradeRecord>> = BTreeMap::new();
    for trade in trades {
        partitions
            .entry(trade.sync_mode)
            .or_default()
            .push(trade.clone());
    }
    partitions
        .into_iter()
        .map(|(mode, records)| (mode, compute_trade_stats(&records)))
        .collect()
}

/// Month-end equity deltas, with the initial capital as the first prior.
pub fn compute_monthly_returns(
    trades: &[TradeRecord],
    equity_curve: &[f64],
    timestamps: &[DateTime<Utc>],
    initial_capital: f64,
) -> Vec<MonthlyReturn> {
    // Last non-NaN equity per (year, month), in chronological order.
    let mut month_end: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for (ts, &equity) in timestamps.iter().zip(equity_curve) {
        if equity.is_nan() {
            continue;
        }
        month_end.insert((ts.year(), ts.month()), equity);
    }

    let mut rows = Vec::with_capacity(month_end.len());
    let mut prev_equity = initial_capital;
    for ((year, month), equity) in month_end {
        if prev_equity == 0.0 {
            continue;
        }
        let return_pct = (equity - prev_equity) / prev_equity * 100.0;
        let trade_count = trades
            .iter()
            .filter(|t| {
                t.exit_time
                    .is_some_and(|exit| exit.year() == year && exit.month() == month)
            })
            .count();
        rows.push(MonthlyReturn {
            month: format!("{year:04}-{month:02}"),
            return_pct,
            trade_count,
        });
        prev_equity = equity;
    }
    rows
}

/// Assemble the full report.
pub fn compute_metrics(
    trades: &[TradeRecord],
    equity_curve: &[f64],
    timestamps: &[DateTime<Utc>],
    initial_capital: f64,
    bars_per_year: f64,
) -> MetricsReport {
    let (total_return_pct, cagr_pct) = return_metrics(equity_curve, initial_capital, bars_per_year);
    let (_dd_series, max_dd, max_dd_duration) = compute_drawdown(equity_curve);

    let sharpe = compute_sharpe(equity_curve, bars_per_year);
    let sortino = compute_sortino(equity_curve, bars_per_year);
    let calmar = compute_calmar(cagr_pct, max_dd * 100.0);

    let valid: Vec<f64> = equity_curve.iter().copied().filter(|v| !v.is_nan()).collect();
    let final_equity = valid.last().copied().unwrap_or(initial_capital);
    let peak_equity = valid.iter().copied().fold(initial_capital, f64::max);

    MetricsReport {
        total_return_pct,
        cagr_pct,
        max_drawdown_pct: max_dd * 100.0,
        max_drawdown_duration_bars: max_dd_duration,
        sharpe_ratio: sharpe,
        sortino_ratio: sortino,
        calmar_ratio: calmar,
        trade_stats: compute_trade_stats(trades),
        sync_stats: compute_sync_stats(trades),
        monthly_returns: compute_monthly_returns(
            trades,
            equity_curve,
            timestamps,
            initial_capital,
        ),
        final_equity,
        peak_equity,
    }
}
