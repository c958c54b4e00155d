//! Trace events as consumed by the analysis.
//!
//! The trace reader is external; it hands over events one at a time, in
//! non-decreasing timestamp order. Each event carries the rank the reader
//! assigned to it, which is what makes two events with the same name and
//! timestamp distinguishable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;
use crate::value::Value;

/// Name given to the synthetic marker injected when the tracer dropped events.
pub const LOST_EVENTS_NAME: &str = "Lost event";

/// Identity of an event inside its trace (the reader-assigned rank).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    /// Creates an event id from a trace rank.
    #[must_use]
    pub const fn new(rank: u64) -> Self {
        Self(rank)
    }

    /// Returns the trace rank.
    #[must_use]
    pub const fn rank(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Regular events versus the "events were lost" marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An ordinary trace event.
    #[default]
    Regular,
    /// The tracer dropped events before this point.
    LostEvents,
}

/// One event of the trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Reader-assigned identity.
    pub id: EventId,
    /// Event name, e.g. `sched_switch`.
    pub name: String,
    /// Trace timestamp.
    pub timestamp: Timestamp,
    /// Payload fields.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Whether this is a lost-events marker.
    #[serde(default)]
    pub kind: EventKind,
}

impl TraceEvent {
    /// Creates a regular event without payload.
    #[must_use]
    pub fn new(rank: u64, name: impl Into<String>, timestamp: impl Into<Timestamp>) -> Self {
        Self {
            id: EventId::new(rank),
            name: name.into(),
            timestamp: timestamp.into(),
            fields: BTreeMap::new(),
            kind: EventKind::Regular,
        }
    }

    /// Creates a lost-events marker.
    #[must_use]
    pub fn lost(rank: u64, timestamp: impl Into<Timestamp>) -> Self {
        Self {
            kind: EventKind::LostEvents,
            ..Self::new(rank, LOST_EVENTS_NAME, timestamp)
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns a payload field, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns true for the lost-events marker.
    #[must_use]
    pub const fn is_lost_events(&self) -> bool {
        matches!(self.kind, EventKind::LostEvents)
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp, self.name)?;
        if !self.fields.is_empty() {
            let parts: Vec<String> = self.fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, " {{ {} }}", parts.join(", "))?;
        }
        Ok(())
    }
}
