//! Shared builders for the integration suite.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use zonal::{
    config::Config,
    data::{
        candle::{Candle, CandleSeries},
        domain::{Price, Timeframe},
    },
};

/// Minute-granular timestamp on 2024-01-02, the first trading day of the
/// default test window.
pub fn ts(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap() + chrono::Duration::minutes(minute)
}

pub fn candle(minute: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        time: ts(minute),
        open: Price(open),
        high: Price(high),
        low: Price(low),
        close: Price(close),
        volume: 100,
    }
}

/// Deterministic pseudo-noise without a RNG dependency: a tiny LCG over
/// the bar index, mapped to [-1, 1].
fn noise(seed: u64, index: u64) -> f64 {
    let mut state = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(index.wrapping_mul(1442695040888963407));
    state ^= state >> 33;
    state = state.wrapping_mul(0xff51afd7ed558ccd);
    state ^= state >> 33;
    (state % 2000) as f64 / 1000.0 - 1.0
}

/// Synthetic 1m series: uptrend, pullback, consolidation, continuation.
/// Fully deterministic for a given seed.
pub fn make_trending_series(n_bars: usize, base_price: f64, seed: u64) -> CandleSeries {
    let mut candles = Vec::with_capacity(n_bars);
    let mut price = base_price;

    for i in 0..n_bars {
        let drift = match i {
            _ if i < n_bars / 3 => 2.0,
            _ if i < n_bars / 2 => -1.5,
            _ if i < 2 * n_bars / 3 => 0.5,
            _ => 1.5,
        };
        price += drift + 1.5 * noise(seed, i as u64);

        let open = price + 0.8 * noise(seed.wrapping_add(1), i as u64);
        let close = price + 0.8 * noise(seed.wrapping_add(2), i as u64);
        let spread = 1.5 + 1.2 * noise(seed.wrapping_add(3), i as u64).abs();
        let high = open.max(close) + spread;
        let low = open.min(close) - spread;

        candles.push(candle(i as i64, open, high, low, close));
    }

    CandleSeries::new(candles).expect("synthetic series must satisfy the OHLC invariants")
}

/// Config with a reduced timeframe set for faster integration runs.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.data.timeframes = vec![
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
    ];
    config.backtest.start_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    config.backtest.end_date = chrono::NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
    config.backtest.initial_capital = 10_000.0;
    config
}
