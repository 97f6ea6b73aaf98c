use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};
use strum_macros::EnumString;

use crate::{
    impl_abs_primitive, impl_add_sub_mul_div_primitive, impl_from_primitive, impl_neg_primitive,
};

// ================================================================================================
// Domain Strong Types (NewTypes)
// ================================================================================================

/// Represents a price level in the quote currency.
///
/// Used for: Open, High, Low, Close, zone boundaries, stops, and targets.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Price(pub f64);
impl_from_primitive!(Price, f64);
impl_add_sub_mul_div_primitive!(Price, f64);
impl_neg_primitive!(Price, f64);
impl_abs_primitive!(Price, f64);

impl Price {
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Self(self.0.max(other.0))
    }
}

/// Represents an amount of the traded instrument.
///
/// This is the unit of position size. It wraps `f64` to support fractional
/// sizes while providing strong typing against `Price`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Quantity(pub f64);
impl_from_primitive!(Quantity, f64);
impl_add_sub_mul_div_primitive!(Quantity, f64);

/// Directional attribute shared by every artifact in the system.
///
/// Replaces the source convention of bare `+1` / `-1` integers. A bullish
/// artifact is a demand-side zone or buy-side level; bearish is the mirror.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    /// The numeric sign of the direction: `+1.0` bullish, `-1.0` bearish.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
        }
    }

    pub fn flipped(&self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
        }
    }

    pub fn is_bullish(&self) -> bool {
        matches!(self, Direction::Bullish)
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Bucket width used to resample the 1m base series.
///
/// `Ord` follows bucket width, so iterating a `BTreeMap<Timeframe, _>` walks
/// from the lowest to the highest timeframe.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
pub enum Timeframe {
    #[strum(serialize = "1m")]
    #[serde(rename = "1m")]
    M1,
    #[strum(serialize = "5m")]
    #[serde(rename = "5m")]
    M5,
    #[strum(serialize = "15m")]
    #[serde(rename = "15m")]
    M15,
    #[strum(serialize = "30m")]
    #[serde(rename = "30m")]
    M30,
    #[strum(serialize = "1H")]
    #[serde(rename = "1H")]
    H1,
    #[strum(serialize = "4H")]
    #[serde(rename = "4H")]
    H4,
    #[strum(serialize = "1D")]
    #[serde(rename = "1D")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Bucket width in minutes. 1D buckets open at 00:00 UTC; intra-day
    /// buckets align to minute 0 of the hour through epoch flooring.
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn bucket_secs(&self) -> i64 {
        self.minutes() * 60
    }

    pub fn is_base(&self) -> bool {
        matches!(self, Timeframe::M1)
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}
