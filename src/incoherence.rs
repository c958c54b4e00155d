//! Incoherence records.
//!
//! An incoherence is an event a scenario could not accept from its current
//! state although some other state of the FSM would have. The record keeps
//! everything inference later needs: the last accepted event, the state the
//! scenario was in, and the transitions that could have fired instead.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correlation::CorrelationKey;
use crate::event::{EventId, TraceEvent};
use crate::fsm::{StateId, TransitionKey, TransitionRef};
use crate::scenario::ScenarioId;
use crate::time::Timestamp;

const INCOHERENCE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a8e_4d3b_4f0a_9e57_1b2c_3d4e_5f60);

/// Identity of an incoherence: derived from (event, correlation key), so the
/// same event can never be recorded twice for the same scenario key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IncoherenceId(Uuid);

impl IncoherenceId {
    /// Derives the id from the event rank and the correlation key.
    #[must_use]
    pub fn derive(event: EventId, key: &CorrelationKey) -> Self {
        let name = format!("{}:{}", event.rank(), key);
        Self(Uuid::new_v5(&INCOHERENCE_NAMESPACE, name.as_bytes()))
    }
}

impl fmt::Display for IncoherenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How far inference got with an incoherence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Inference has not run yet.
    #[default]
    Pending,
    /// An inferred path explains the incoherent event.
    Resolved,
    /// No path leads from the last coherent state to any candidate.
    Unresolved,
}

/// One step of an inferred path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InferredTransition {
    /// The transition taken.
    pub transition: TransitionRef,
    /// Event name the transition is assumed to have been taken with.
    pub event: String,
    /// State reached.
    pub target: StateId,
}

/// An event its scenario's state rejected while another state accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incoherence {
    id: IncoherenceId,
    fsm_id: String,
    scenario: ScenarioId,
    key: CorrelationKey,
    event: TraceEvent,
    previous_event: Option<TraceEvent>,
    state: StateId,
    state_name: String,
    candidates: Vec<TransitionKey>,
    inferred: Vec<InferredTransition>,
    status: ResolutionStatus,
}

impl Incoherence {
    /// Stable id.
    #[must_use]
    pub const fn id(&self) -> IncoherenceId {
        self.id
    }

    /// FSM the scenario belongs to.
    #[must_use]
    pub fn fsm_id(&self) -> &str {
        &self.fsm_id
    }

    /// Scenario that rejected the event.
    #[must_use]
    pub const fn scenario(&self) -> ScenarioId {
        self.scenario
    }

    /// Correlation key of that scenario.
    #[must_use]
    pub const fn key(&self) -> &CorrelationKey {
        &self.key
    }

    /// The event that could not be accepted.
    #[must_use]
    pub const fn event(&self) -> &TraceEvent {
        &self.event
    }

    /// The last event the scenario accepted before, if any.
    #[must_use]
    pub const fn previous_event(&self) -> Option<&TraceEvent> {
        self.previous_event.as_ref()
    }

    /// State the scenario was in when the event arrived.
    #[must_use]
    pub const fn state(&self) -> StateId {
        self.state
    }

    /// Name of the state that rejected the event.
    #[must_use]
    pub fn state_name(&self) -> &str {
        &self.state_name
    }

    /// Transitions of other states that accept the event, in declaration order.
    #[must_use]
    pub fn candidates(&self) -> &[TransitionKey] {
        &self.candidates
    }

    /// Inferred path, ending with the transition that explains the event.
    #[must_use]
    pub fn inferred(&self) -> &[InferredTransition] {
        &self.inferred
    }

    /// Inference status.
    #[must_use]
    pub const fn status(&self) -> ResolutionStatus {
        self.status
    }

    /// Timestamp of the incoherent event.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        self.event.timestamp
    }

    /// State reached at the end of the inferred path.
    #[must_use]
    pub fn final_target(&self) -> Option<StateId> {
        self.inferred.last().map(|t| t.target)
    }

    pub(crate) fn resolve(&mut self, inferred: Vec<InferredTransition>) {
        self.status = if inferred.is_empty() {
            ResolutionStatus::Unresolved
        } else {
            ResolutionStatus::Resolved
        };
        self.inferred = inferred;
    }

    pub(crate) fn reset(&mut self) {
        self.inferred.clear();
        self.status = ResolutionStatus::Pending;
    }

    fn sort_key(&self) -> (Timestamp, EventId, &CorrelationKey) {
        (self.event.timestamp, self.event.id, &self.key)
    }
}

/// Incoherence detected before the scenario knew its correlation key.
#[derive(Debug, Clone)]
pub(crate) struct IncoherenceDraft {
    pub(crate) event: TraceEvent,
    pub(crate) previous_event: Option<TraceEvent>,
    pub(crate) state: StateId,
    pub(crate) state_name: String,
    pub(crate) candidates: Vec<TransitionKey>,
}

impl IncoherenceDraft {
    pub(crate) fn complete(self, fsm_id: &str, scenario: ScenarioId, key: CorrelationKey) -> Incoherence {
        Incoherence {
            id: IncoherenceId::derive(self.event.id, &key),
            fsm_id: fsm_id.to_string(),
            scenario,
            key,
            event: self.event,
            previous_event: self.previous_event,
            state: self.state,
            state_name: self.state_name,
            candidates: self.candidates,
            inferred: Vec::new(),
            status: ResolutionStatus::Pending,
        }
    }
}

/// Chronologically ordered, duplicate-free incoherences of one FSM.
#[derive(Debug, Clone, Default)]
pub struct IncoherenceLog {
    entries: Vec<Incoherence>,
    ids: HashSet<IncoherenceId>,
}

impl IncoherenceLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts in (timestamp, event rank, key) order. Returns false for a
    /// duplicate identity.
    pub fn insert(&mut self, incoherence: Incoherence) -> bool {
        if !self.ids.insert(incoherence.id) {
            return false;
        }
        let pos = self
            .entries
            .partition_point(|e| e.sort_key().cmp(&incoherence.sort_key()) != Ordering::Greater);
        self.entries.insert(pos, incoherence);
        true
    }

    /// Incoherences in stream order.
    #[must_use]
    pub fn as_slice(&self) -> &[Incoherence] {
        &self.entries
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Incoherence> {
        self.entries.iter_mut()
    }

    /// Number of incoherences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(rank: u64, ts: u64) -> IncoherenceDraft {
        IncoherenceDraft {
            event: TraceEvent::new(rank, "exit", ts),
            previous_event: None,
            state: StateId(0),
            state_name: "S0".to_string(),
            candidates: Vec::new(),
        }
    }

    #[test]
    fn test_id_is_stable() {
        let key = CorrelationKey::new("42");
        assert_eq!(
            IncoherenceId::derive(EventId::new(3), &key),
            IncoherenceId::derive(EventId::new(3), &key)
        );
        assert_ne!(
            IncoherenceId::derive(EventId::new(3), &key),
            IncoherenceId::derive(EventId::new(3), &CorrelationKey::new("43"))
        );
    }

    #[test]
    fn test_log_orders_and_dedups() {
        let scenario = ScenarioId::new();
        let mut log = IncoherenceLog::new();
        assert!(log.insert(draft(5, 30).complete("f", scenario, "1".into())));
        assert!(log.insert(draft(2, 10).complete("f", scenario, "1".into())));
        assert!(log.insert(draft(3, 10).complete("f", scenario, "1".into())));
        assert!(!log.insert(draft(2, 10).complete("f", scenario, "1".into())));

        let ranks: Vec<u64> = log.as_slice().iter().map(|i| i.event().id.rank()).collect();
        assert_eq!(ranks, vec![2, 3, 5]);
    }

    #[test]
    fn test_resolution() {
        let mut inc = draft(1, 1).complete("f", ScenarioId::new(), "k".into());
        assert_eq!(inc.status(), ResolutionStatus::Pending);
        inc.resolve(Vec::new());
        assert_eq!(inc.status(), ResolutionStatus::Unresolved);
        inc.resolve(vec![InferredTransition {
            transition: TransitionRef {
                source: StateId(0),
                index: 0,
            },
            event: "exit".into(),
            target: StateId(1),
        }]);
        assert_eq!(inc.status(), ResolutionStatus::Resolved);
        assert_eq!(inc.final_target(), Some(StateId(1)));
        inc.reset();
        assert!(inc.inferred().is_empty());
    }
}
