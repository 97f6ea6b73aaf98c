//! Plain-text run summary.

use std::fmt::Write;

use crate::report::metrics::MetricsReport;

/// Render the metrics record as a readable block of text.
pub fn render_summary(metrics: &MetricsReport) -> String {
    let mut out = String::new();
    let stats = &metrics.trade_stats;

    let _ = writeln!(out, "================ BACKTEST SUMMARY ================");
    let _ = writeln!(out, "Total return:        {:>10.2}%", metrics.total_return_pct);
    let _ = writeln!(out, "CAGR:                {:>10.2}%", metrics.cagr_pct);
    let _ = writeln!(out, "Final equity:        {:>10.2}", metrics.final_equity);
    let _ = writeln!(out, "Peak equity:         {:>10.2}", metrics.peak_equity);
    let _ = writeln!(out, "Max drawdown:        {:>10.2}%", metrics.max_drawdown_pct);
    let _ = writeln!(
        out,
        "Max DD duration:     {:>10} bars",
        metrics.max_drawdown_duration_bars
    );
    let _ = writeln!(out, "Sharpe ratio:        {:>10.2}", metrics.sharpe_ratio);
    let _ = writeln!(out, "Sortino ratio:       {:>10.2}", metrics.sortino_ratio);
    let _ = writeln!(out, "Calmar ratio:        {:>10.2}", metrics.calmar_ratio);
    let _ = writeln!(out, "--------------------------------------------------");
    let _ = writeln!(out, "Trades:              {:>10}", stats.total_trades);
    let _ = writeln!(
        out,
        "  wins / losses / be: {:>4} / {:>4} / {:>4}",
        stats.winning_trades, stats.losing_trades, stats.breakeven_trades
    );
    let _ = writeln!(out, "Win rate:            {:>10.2}%", stats.win_rate_pct);
    let _ = writeln!(out, "Avg R:               {:>10.2}", stats.avg_rr);
    let _ = writeln!(out, "Profit factor:       {:>10.2}", stats.profit_factor);
    let _ = writeln!(out, "Expectancy (R):      {:>10.2}", stats.expectancy);

    if !metrics.sync_stats.is_empty() {
        let _ = writeln!(out, "--------------------------------------------------");
        let _ = writeln!(out, "By sync mode:");
        for (mode, mode_stats) in &metrics.sync_stats {
            let _ = writeln!(
                out,
                "  {:<10} trades {:>4}  win rate {:>6.2}%  avg R {:>6.2}",
                mode.to_string(),
                mode_stats.total_trades,
                mode_stats.win_rate_pct,
                mode_stats.avg_rr
            );
        }
    }

    if !metrics.monthly_returns.is_empty() {
        let _ = writeln!(out, "--------------------------------------------------");
        let _ = writeln!(out, "Monthly returns:");
        for row in &metrics.monthly_returns {
            let _ = writeln!(
                out,
                "  {}  {:>8.2}%  ({} trades)",
                row.month, row.return_pct, row.trade_count
            );
        }
    }

    let _ = writeln!(out, "==================================================");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::metrics::{MonthlyReturn, TradeStats};

    #[test]
    fn summary_renders_key_figures() {
        let metrics = MetricsReport {
            total_return_pct: 12.5,
            final_equity: 11_250.0,
            trade_stats: TradeStats {
                total_trades: 7,
                winning_trades: 4,
                losing_trades: 2,
                breakeven_trades: 1,
                win_rate_pct: 57.14,
                ..TradeStats::default()
            },
            monthly_returns: vec![MonthlyReturn {
                month: "2024-01".to_string(),
                return_pct: 3.2,
                trade_count: 2,
            }],
            ..MetricsReport::default()
        };

        let text = render_summary(&metrics);
        assert!(text.contains("12.50%"), "total return rendered");
        assert!(text.contains("Trades:"), "trade section present");
        assert!(text.contains("2024-01"), "monthly section present");
    }
}
