//! Append-only event log for the run's audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

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
pub enum EventKind {
    PoiRegistered,
    PoiTapped,
    Entry,
    Exit,
    BeMoved,
    SlModified,
    Addon,
    BiasUpdated,
    SyncUpdated,
    PositionRejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub poi_id: String,
    pub details: Map<String, Value>,
}

/// Append-only; events are recorded in emission order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(
        &mut self,
        kind: EventKind,
        timestamp: DateTime<Utc>,
        poi_id: impl Into<String>,
        details: Map<String, Value>,
    ) {
        self.events.push(Event {
            kind,
            timestamp,
            poi_id: poi_id.into(),
            details,
        });
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}
