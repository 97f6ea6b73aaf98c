//! HTF/LTF bias alignment and the resulting position-size multiplier.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{config::RiskConfig, context::bias::Bias};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    Sync,
    Desync,
    #[default]
    Undefined,
}

/// Equal defined biases are SYNC, opposite are DESYNC, anything touching
/// UNDEFINED stays UNDEFINED.
pub fn check_sync(htf_bias: Bias, ltf_bias: Bias) -> SyncMode {
    if htf_bias == Bias::Undefined || ltf_bias == Bias::Undefined {
        return SyncMode::Undefined;
    }
    if htf_bias == ltf_bias {
        SyncMode::Sync
    } else {
        SyncMode::Desync
    }
}

/// SYNC trades full size, DESYNC reduced, UNDEFINED does not trade.
pub fn position_size_multiplier(sync_mode: SyncMode, risk: &RiskConfig) -> f64 {
    match sync_mode {
        SyncMode::Sync => risk.position_size_sync,
        SyncMode::Desync => risk.position_size_desync,
        SyncMode::Undefined => 0.0,
    }
}
