//! Breaker block detection.
//!
//! A breaker is a failed order block: price closed through it, inverting
//! its role. Former support acts as resistance and vice versa.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    concepts::orderblocks::{ObStatus, OrderBlock},
    data::domain::{Direction, Price},
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
pub enum BreakerStatus {
    Active,
    Tested,
    Mitigated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breaker {
    /// Inverted from the original order block.
    pub direction: Direction,
    pub top: Price,
    pub bottom: Price,
    pub original_ob_index: usize,
    /// Bar where the original block broke; the breaker exists from here.
    pub broken_index: usize,
    pub status: BreakerStatus,
}

/// Broken order blocks become direction-inverted breakers.
pub fn detect_breakers(orderblocks: &[OrderBlock]) -> Vec<Breaker> {
    orderblocks
        .iter()
        .filter(|ob| ob.status == ObStatus::Broken)
        .filter_map(|ob| {
            ob.broken_index.map(|broken_index| Breaker {
                direction: ob.direction.flipped(),
                top: ob.top,
                bottom: ob.bottom,
                original_ob_index: ob.ob_index,
                broken_index,
                status: BreakerStatus::Active,
            })
        })
        .collect()
}
