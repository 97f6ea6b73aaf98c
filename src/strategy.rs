pub mod addons;
pub mod confirmations;
pub mod entries;
pub mod exits;
pub mod fta;
pub mod risk;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::data::domain::Direction;

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
pub enum SignalKind {
    Enter,
    Exit,
    ModifySl,
    MoveToBe,
    AddOn,
}

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
pub enum ExitReason {
    TargetHit,
    StopLossHit,
    EndOfData,
}

/// A trading signal produced by the strategy layer and consumed by the
/// portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub poi_id: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub stop_loss: f64,
    pub target: f64,
    /// Sync-mode size multiplier: 1.0 sync, 0.5 desync.
    pub size_multiplier: f64,
    pub reason: String,
    pub metadata: Map<String, Value>,
}

impl Signal {
    pub fn new(
        kind: SignalKind,
        poi_id: impl Into<String>,
        direction: Direction,
        timestamp: DateTime<Utc>,
        price: f64,
    ) -> Self {
        Self {
            kind,
            poi_id: poi_id.into(),
            direction,
            timestamp,
            price,
            stop_loss: 0.0,
            target: 0.0,
            size_multiplier: 1.0,
            reason: String::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: f64) -> Self {
        self.stop_loss = stop_loss;
        self
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target = target;
        self
    }

    pub fn with_size_multiplier(mut self, size_multiplier: f64) -> Self {
        self.size_multiplier = size_multiplier;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
