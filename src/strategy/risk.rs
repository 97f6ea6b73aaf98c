//! Stop-loss placement, position sizing, and risk validation.

use std::str::FromStr;

use strum::EnumString;

use crate::{
    concepts::{fvg::Fvg, liquidity::LiquidityLevel, poi::Poi},
    config::RiskConfig,
    context::sync::{SyncMode, position_size_multiplier},
    data::domain::Direction,
};

/// Stop buffer as a fraction of the POI midpoint.
const STOP_BUFFER_PCT: f64 = 0.0005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StopLossMethod {
    #[default]
    BehindPoi,
    BehindFvg,
    BehindCvb,
    BehindLiquidity,
}

/// Compute the stop level for a trade out of `poi`.
///
/// An unrecognized method name falls back to behind-POI with a warning;
/// so does any method that has no data to work with.
pub fn calculate_stop_loss(
    poi: &Poi,
    direction: Direction,
    nearby_fvgs: &[Fvg],
    nearby_liquidity: &[&LiquidityLevel],
    method_name: &str,
) -> f64 {
    let method = StopLossMethod::from_str(method_name).unwrap_or_else(|_| {
        tracing::warn!(method = method_name, "unknown stop-loss method, using behind_poi");
        StopLossMethod::BehindPoi
    });

    let buffer = STOP_BUFFER_PCT * poi.midpoint.0;

    let behind_poi = || match direction {
        Direction::Bullish => poi.bottom.0 - buffer,
        Direction::Bearish => poi.top.0 + buffer,
    };

    let result = match method {
        StopLossMethod::BehindPoi => Some(behind_poi()),
        StopLossMethod::BehindFvg => match direction {
            Direction::Bullish => nearby_fvgs
                .iter()
                .filter(|f| f.direction == Direction::Bullish)
                .map(|f| f.bottom.0)
                .min_by(|a, b| a.total_cmp(b))
                .map(|level| level - buffer),
            Direction::Bearish => nearby_fvgs
                .iter()
                .filter(|f| f.direction == Direction::Bearish)
                .map(|f| f.top.0)
                .max_by(|a, b| a.total_cmp(b))
                .map(|level| level + buffer),
        },
        StopLossMethod::BehindCvb => match direction {
            Direction::Bullish => nearby_fvgs
                .iter()
                .filter(|f| f.direction == Direction::Bullish)
                .map(|f| f.midpoint.0)
                .min_by(|a, b| a.total_cmp(b))
                .map(|level| level - buffer),
            Direction::Bearish => nearby_fvgs
                .iter()
                .filter(|f| f.direction == Direction::Bearish)
                .map(|f| f.midpoint.0)
                .max_by(|a, b| a.total_cmp(b))
                .map(|level| level + buffer),
        },
        StopLossMethod::BehindLiquidity => match direction {
            // A long hides its stop under sell-side liquidity.
            Direction::Bullish => nearby_liquidity
                .iter()
                .filter(|l| l.direction == Direction::Bearish)
                .map(|l| l.level.0)
                .min_by(|a, b| a.total_cmp(b))
                .map(|level| level - buffer),
            Direction::Bearish => nearby_liquidity
                .iter()
                .filter(|l| l.direction == Direction::Bullish)
                .map(|l| l.level.0)
                .max_by(|a, b| a.total_cmp(b))
                .map(|level| level + buffer),
        },
    };

    result.unwrap_or_else(behind_poi)
}

/// Risk-based sizing: `(equity x max_risk / stop_distance) x sync_mult`.
/// A zero stop distance sizes to zero.
pub fn calculate_position_size(
    account_equity: f64,
    entry_price: f64,
    stop_loss: f64,
    sync_mode: SyncMode,
    risk: &RiskConfig,
) -> f64 {
    let risk_amount = account_equity * risk.max_risk_per_trade;
    let distance = (entry_price - stop_loss).abs();
    if distance == 0.0 {
        return 0.0;
    }
    (risk_amount / distance) * position_size_multiplier(sync_mode, risk)
}

/// Reward-to-risk validation. Returns `(is_valid, actual_rr)`; entries
/// with non-positive risk or `rr < min_rr` are rejected.
pub fn validate_risk(
    entry_price: f64,
    stop_loss: f64,
    target: f64,
    direction: Direction,
    min_rr: f64,
) -> (bool, f64) {
    let (reward, risk) = match direction {
        Direction::Bullish => (target - entry_price, entry_price - stop_loss),
        Direction::Bearish => (entry_price - target, stop_loss - entry_price),
    };

    if risk <= 0.0 {
        return (false, 0.0);
    }
    let rr = reward / risk;
    (rr >= min_rr, rr)
}

/// Break-even stop: entry shifted by twice the commission so a BE exit
/// nets out flat.
pub fn breakeven_level(entry_price: f64, direction: Direction, commission_pct: f64) -> f64 {
    match direction {
        Direction::Bullish => entry_price * (1.0 + 2.0 * commission_pct),
        Direction::Bearish => entry_price * (1.0 - 2.0 * commission_pct),
    }
}
