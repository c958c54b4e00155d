//! Live FSM instances.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::correlation::CorrelationKey;
use crate::counters::TransitionCounters;
use crate::event::TraceEvent;
use crate::fsm::{FsmDefinition, StateId, TransitionKey, TransitionRef};
use crate::value::Value;

/// Unique identifier for a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScenarioId(Uuid);

impl ScenarioId {
    /// Creates a random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying uuid.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ScenarioId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// Waiting for its first transition.
    Pending,
    /// Took at least one transition and is still running.
    InProgress,
    /// Reached the final state.
    Matched,
    /// Reached the abandon state, or was still running when the stream ended.
    Abandoned,
}

impl ScenarioStatus {
    /// Whether the scenario still accepts events.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

/// Whether the scenario's current state is unambiguously known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Certainty {
    /// The state is known.
    Certain,
    /// Events may have been lost since the last transition.
    Uncertain,
}

/// Values stored by transition actions, read back by conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioContext {
    stored: BTreeMap<String, Value>,
}

impl ScenarioContext {
    /// Stores a value under `key`.
    pub fn store(&mut self, key: impl Into<String>, value: Value) {
        self.stored.insert(key.into(), value);
    }

    /// Reads a stored value.
    #[must_use]
    pub fn stored(&self, key: &str) -> Option<&Value> {
        self.stored.get(key)
    }

    /// Forgets every stored value.
    pub fn clear(&mut self) {
        self.stored.clear();
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }
}

/// One instance of an FSM following one correlation key.
#[derive(Debug, Clone)]
pub struct Scenario {
    id: ScenarioId,
    fsm_id: String,
    key: Option<CorrelationKey>,
    state: StateId,
    status: ScenarioStatus,
    certainty: Certainty,
    context: ScenarioContext,
    local: TransitionCounters,
}

impl Scenario {
    /// A pending scenario in the FSM's initial state.
    ///
    /// Nothing is known yet about the entity, so it starts uncertain.
    #[must_use]
    pub fn new(fsm: &FsmDefinition) -> Self {
        Self {
            id: ScenarioId::new(),
            fsm_id: fsm.id().to_string(),
            key: None,
            state: fsm.initial_state(),
            status: ScenarioStatus::Pending,
            certainty: Certainty::Uncertain,
            context: ScenarioContext::default(),
            local: TransitionCounters::new(),
        }
    }

    /// Scenario id.
    #[must_use]
    pub const fn id(&self) -> ScenarioId {
        self.id
    }

    /// FSM id.
    #[must_use]
    pub fn fsm_id(&self) -> &str {
        &self.fsm_id
    }

    /// Correlation key, once bound.
    #[must_use]
    pub const fn key(&self) -> Option<&CorrelationKey> {
        self.key.as_ref()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> StateId {
        self.state
    }

    /// Lifecycle status.
    #[must_use]
    pub const fn status(&self) -> ScenarioStatus {
        self.status
    }

    /// Certainty of the current state.
    #[must_use]
    pub const fn certainty(&self) -> Certainty {
        self.certainty
    }

    /// Values stored by actions.
    #[must_use]
    pub const fn context(&self) -> &ScenarioContext {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut ScenarioContext {
        &mut self.context
    }

    /// Transitions this scenario took.
    #[must_use]
    pub const fn local_counters(&self) -> &TransitionCounters {
        &self.local
    }

    /// Whether the scenario still accepts events.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub(crate) fn bind_key(&mut self, key: CorrelationKey) {
        self.key = Some(key);
    }

    pub(crate) fn force_state(&mut self, state: StateId) {
        self.state = state;
    }

    pub(crate) fn mark_uncertain(&mut self) {
        self.certainty = Certainty::Uncertain;
    }

    /// Moves along `taken`, updating the local counter, status and certainty.
    pub(crate) fn apply_transition(&mut self, fsm: &FsmDefinition, taken: TransitionRef, event: &TraceEvent) {
        let Some(target) = fsm.transition(taken).map(|t| t.target()) else {
            return;
        };
        self.local.increment(TransitionKey::new(taken, event.name.as_str()));
        self.state = target;

        if self.status == ScenarioStatus::Pending {
            self.status = ScenarioStatus::InProgress;
            debug!(fsm = %self.fsm_id, scenario = %self.id, event = %event.name, "scenario started");
        }
        if Some(target) == fsm.final_state() {
            self.status = ScenarioStatus::Matched;
            debug!(fsm = %self.fsm_id, scenario = %self.id, "scenario matched");
        } else if Some(target) == fsm.abandon_state() {
            self.status = ScenarioStatus::Abandoned;
            debug!(fsm = %self.fsm_id, scenario = %self.id, "scenario abandoned");
        }

        if fsm.is_certain(taken, &event.name) {
            self.certainty = Certainty::Certain;
        }
    }

    /// Ends a scenario still running when the stream is over.
    pub(crate) fn dispose(&mut self) {
        if self.is_active() {
            self.status = ScenarioStatus::Abandoned;
        }
    }
}
