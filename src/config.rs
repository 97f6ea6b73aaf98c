//! Run configuration.
//!
//! Plain nested records with serde defaults; any serde front-end can
//! deserialize a [`Config`]. Validation applies the fail-fast rules once,
//! before the first bar is processed.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    concepts::{fvg::MitigationMode, structure::BreakMode},
    data::domain::Timeframe,
    error::{ConfigError, ZonalResult},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Timeframes to precompute. Must contain 1m, which drives the loop.
    pub timeframes: Vec<Timeframe>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            timeframes: Timeframe::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    pub break_mode: BreakMode,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            break_mode: BreakMode::Close,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FvgConfig {
    pub min_gap_pct: f64,
    pub join_consecutive: bool,
    pub mitigation_mode: MitigationMode,
    pub max_age_bars: usize,
}

impl Default for FvgConfig {
    fn default() -> Self {
        Self {
            min_gap_pct: 0.0005,
            join_consecutive: true,
            mitigation_mode: MitigationMode::Close,
            max_age_bars: 192,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityConfig {
    pub range_percent: f64,
    pub min_touches: usize,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            range_percent: 0.001,
            min_touches: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptsConfig {
    /// Swing window half-width per timeframe.
    pub swing_length: BTreeMap<Timeframe, usize>,
    pub structure: StructureConfig,
    pub fvg: FvgConfig,
    pub liquidity: LiquidityConfig,
    /// Zone-overlap tolerance used by the POI builder.
    pub overlap_tolerance: f64,
}

impl ConceptsConfig {
    pub fn swing_length_for(&self, timeframe: Timeframe) -> usize {
        self.swing_length.get(&timeframe).copied().unwrap_or(5)
    }
}

impl Default for ConceptsConfig {
    fn default() -> Self {
        let swing_length = BTreeMap::from([
            (Timeframe::M1, 3),
            (Timeframe::M5, 5),
            (Timeframe::M15, 5),
            (Timeframe::M30, 5),
            (Timeframe::H1, 7),
            (Timeframe::H4, 10),
            (Timeframe::D1, 10),
        ]);
        Self {
            swing_length,
            structure: StructureConfig::default(),
            fvg: FvgConfig::default(),
            liquidity: LiquidityConfig::default(),
            overlap_tolerance: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationsConfig {
    pub min_count: usize,
    pub max_count: usize,
}

impl Default for ConfirmationsConfig {
    fn default() -> Self {
        Self {
            min_count: 5,
            max_count: 8,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntryMode {
    #[default]
    Conservative,
    Aggressive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    pub mode: EntryMode,
    /// After a 5th-confirm trap, wait for a return-to-FVG test.
    pub rto_wait: bool,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            mode: EntryMode::Conservative,
            rto_wait: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakevenConfig {
    pub structural_bu: bool,
    pub fta_bu: bool,
    pub range_bu: bool,
}

impl Default for BreakevenConfig {
    fn default() -> Self {
        Self {
            structural_bu: true,
            fta_bu: true,
            range_bu: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub position_size_sync: f64,
    pub position_size_desync: f64,
    pub max_risk_per_trade: f64,
    pub max_concurrent_positions: usize,
    /// Stop-loss placement method; an unrecognized name falls back to
    /// behind-POI with a warning.
    pub stop_loss_method: String,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            position_size_sync: 1.0,
            position_size_desync: 0.5,
            max_risk_per_trade: 0.02,
            max_concurrent_positions: 3,
            stop_loss_method: "behind_liquidity".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Timeframes scanned for distant targets when SYNC.
    pub primary_tf: Vec<Timeframe>,
    /// Timeframes scanned for local targets when DESYNC.
    pub local_tf: Vec<Timeframe>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            primary_tf: vec![Timeframe::H4, Timeframe::H1],
            local_tf: vec![Timeframe::M30, Timeframe::M15],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FtaConfig {
    pub close_threshold_pct: f64,
}

impl Default for FtaConfig {
    fn default() -> Self {
        Self {
            close_threshold_pct: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub confirmations: ConfirmationsConfig,
    pub entry: EntryConfig,
    pub breakeven: BreakevenConfig,
    pub risk: RiskConfig,
    pub targets: TargetsConfig,
    pub fta: FtaConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    /// Annualization factor for risk-adjusted metrics.
    pub bars_per_year: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            initial_capital: 10_000.0,
            commission_pct: 0.0006,
            slippage_pct: 0.0002,
            bars_per_year: 252.0 * 390.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub concepts: ConceptsConfig,
    pub strategy: StrategyConfig,
    pub backtest: BacktestConfig,
}

impl Config {
    /// Fail-fast validation at initialization.
    pub fn validate(&self) -> ZonalResult<()> {
        if self.data.timeframes.is_empty() {
            return Err(ConfigError::EmptyTimeframes.into());
        }
        if !self.data.timeframes.contains(&Timeframe::M1) {
            return Err(ConfigError::MissingBaseTimeframe.into());
        }

        let risk = &self.strategy.risk;
        if risk.max_risk_per_trade <= 0.0 || risk.max_risk_per_trade > 1.0 {
            return Err(ConfigError::InvalidRisk(format!(
                "max_risk_per_trade must be in (0, 1], got {}",
                risk.max_risk_per_trade
            ))
            .into());
        }
        if risk.max_concurrent_positions == 0 {
            return Err(
                ConfigError::InvalidRisk("max_concurrent_positions must be >= 1".into()).into(),
            );
        }
        if risk.position_size_sync < 0.0 || risk.position_size_desync < 0.0 {
            return Err(
                ConfigError::InvalidRisk("position size multipliers must be >= 0".into()).into(),
            );
        }

        let bt = &self.backtest;
        if bt.start_date > bt.end_date {
            return Err(ConfigError::InvalidDateRange {
                start: bt.start_date.to_string(),
                end: bt.end_date.to_string(),
            }
            .into());
        }
        if bt.initial_capital <= 0.0 {
            return Err(ConfigError::InvalidValue("initial_capital must be > 0".into()).into());
        }
        if bt.commission_pct < 0.0 || bt.slippage_pct < 0.0 {
            return Err(
                ConfigError::InvalidValue("commission and slippage must be >= 0".into()).into(),
            );
        }
        if bt.bars_per_year <= 0.0 {
            return Err(ConfigError::InvalidValue("bars_per_year must be > 0".into()).into());
        }

        if self.strategy.confirmations.min_count > self.strategy.confirmations.max_count {
            return Err(ConfigError::InvalidValue(
                "confirmations.min_count must not exceed max_count".into(),
            )
            .into());
        }
        if self.strategy.fta.close_threshold_pct < 0.0 {
            return Err(
                ConfigError::InvalidValue("fta.close_threshold_pct must be >= 0".into()).into(),
            );
        }

        Ok(())
    }
}
