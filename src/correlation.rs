//! Binding events to scenarios.
//!
//! A correlation key names the entity a scenario follows (a thread id, a cpu,
//! an object). The resolver decides which keys an event concerns, and so which
//! scenarios see it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::TraceEvent;

/// Identity of the entity a scenario tracks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    /// Creates a key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key of FSMs whose events carry no correlating field.
    #[must_use]
    pub fn global() -> Self {
        Self("*".to_string())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationKey {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

/// Maps events to the correlation keys they apply to.
pub trait CorrelationKeyResolver: Send + Sync {
    /// Keys the event concerns, without duplicates. May be empty.
    fn keys_for(&self, event: &TraceEvent) -> Vec<CorrelationKey>;

    /// Key a pending scenario adopts when `event` starts it.
    fn scenario_key(&self, event: &TraceEvent, keys: &[CorrelationKey]) -> Option<CorrelationKey> {
        let _ = event;
        keys.first().cloned()
    }
}

/// Resolver reading keys from named payload fields.
///
/// # Examples
///
/// ```
/// use tracecoherence::{CorrelationKey, CorrelationKeyResolver, FieldKeyResolver, TraceEvent};
///
/// let resolver = FieldKeyResolver::process();
/// let event = TraceEvent::new(0, "sched_switch", 10)
///     .with_field("prev_tid", 4)
///     .with_field("next_tid", 7);
/// assert_eq!(
///     resolver.keys_for(&event),
///     vec![CorrelationKey::new("4"), CorrelationKey::new("7")]
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldKeyResolver {
    fields: Vec<String>,
    #[serde(default)]
    overrides: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    scenario_fields: BTreeMap<String, String>,
}

impl FieldKeyResolver {
    /// Keys from `fields`, checked in order.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            overrides: BTreeMap::new(),
            scenario_fields: BTreeMap::new(),
        }
    }

    /// Uses `fields` instead of the defaults for events named `event`.
    #[must_use]
    pub fn with_override<I, S>(mut self, event: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides
            .insert(event.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    /// A scenario started by `event` takes its key from `field`.
    #[must_use]
    pub fn with_scenario_field(mut self, event: impl Into<String>, field: impl Into<String>) -> Self {
        self.scenario_fields.insert(event.into(), field.into());
        self
    }

    /// Thread-oriented FSMs: a context switch concerns both threads.
    #[must_use]
    pub fn process() -> Self {
        Self::new(["child_tid", "tid"])
            .with_override("sched_switch", ["prev_tid", "next_tid"])
            .with_scenario_field("sched_switch", "next_tid")
    }

    /// Routes by the `cpu` field.
    #[must_use]
    pub fn cpu() -> Self {
        Self::new(["cpu"])
    }

    /// Routes by the `obj_id` field.
    #[must_use]
    pub fn object() -> Self {
        Self::new(["obj_id"])
    }

    fn fields_for(&self, event: &str) -> &[String] {
        self.overrides.get(event).unwrap_or(&self.fields)
    }
}

impl CorrelationKeyResolver for FieldKeyResolver {
    fn keys_for(&self, event: &TraceEvent) -> Vec<CorrelationKey> {
        let mut keys: Vec<CorrelationKey> = Vec::new();
        for field in self.fields_for(&event.name) {
            if let Some(value) = event.field(field) {
                let key = CorrelationKey::new(value.to_plain_string());
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    fn scenario_key(&self, event: &TraceEvent, keys: &[CorrelationKey]) -> Option<CorrelationKey> {
        self.scenario_fields
            .get(&event.name)
            .and_then(|field| event.field(field))
            .map(|v| CorrelationKey::new(v.to_plain_string()))
            .or_else(|| keys.first().cloned())
    }
}

/// Resolver for FSMs that follow a single, global entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalKeyResolver;

impl CorrelationKeyResolver for GlobalKeyResolver {
    fn keys_for(&self, _event: &TraceEvent) -> Vec<CorrelationKey> {
        vec![CorrelationKey::global()]
    }
}
