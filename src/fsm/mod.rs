//! Finite-state machine definitions.
//!
//! An FSM is an arena of states addressed by dense [`StateId`]s. It is built
//! once from a declarative [`FsmSpec`], validated, and then never changes.
//! Building also precomputes the indexes the coherence checks and the
//! inference rely on:
//!
//! - event name → states with a transition accepting that name,
//! - state → incoming transitions (the reverse graph),
//! - (event pattern, condition) → every target state it can lead to.
//!
//! A reserved ERROR state is appended after the declared states. Its
//! transitions are copies of the initial state's, so a scenario forced into
//! ERROR can restart the pattern.

mod state;
mod transition;

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::condition::{ConditionEvaluator, ConditionId};
use crate::error::ValidationError;
use crate::event::TraceEvent;
use crate::pattern::{EventCatalog, EventPattern};
use crate::scenario::ScenarioContext;

pub use state::{State, StateSpec, ERROR_STATE_NAME};
pub use transition::{StateId, Transition, TransitionKey, TransitionRef, TransitionSpec};

/// Event patterns (and optional guard) gating who may start a scenario.
#[derive(Debug, Clone)]
pub struct Precondition {
    patterns: Vec<EventPattern>,
    condition: Option<ConditionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PreconditionSpec {
    events: Vec<String>,
    #[serde(default)]
    condition: Option<ConditionId>,
}

const fn default_true() -> bool {
    true
}

/// Declarative FSM description, validated by [`FsmSpec::build`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsmSpec {
    id: String,
    states: Vec<StateSpec>,
    #[serde(default)]
    initial: Option<String>,
    #[serde(default)]
    final_state: Option<String>,
    #[serde(default)]
    abandon_state: Option<String>,
    #[serde(default)]
    preconditions: Vec<PreconditionSpec>,
    #[serde(default = "default_true")]
    consuming: bool,
    #[serde(default = "default_true")]
    multiple: bool,
}

impl FsmSpec {
    /// Creates an empty spec.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            states: Vec::new(),
            initial: None,
            final_state: None,
            abandon_state: None,
            preconditions: Vec::new(),
            consuming: true,
            multiple: true,
        }
    }

    /// Appends a state. The first one is the default initial state.
    #[must_use]
    pub fn state(mut self, state: StateSpec) -> Self {
        self.states.push(state);
        self
    }

    /// Sets the initial state. Defaults to the first declared state.
    #[must_use]
    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Reaching this state marks the scenario MATCHED.
    #[must_use]
    pub fn final_state(mut self, name: impl Into<String>) -> Self {
        self.final_state = Some(name.into());
        self
    }

    /// Reaching this state marks the scenario ABANDONED.
    #[must_use]
    pub fn abandon_state(mut self, name: impl Into<String>) -> Self {
        self.abandon_state = Some(name.into());
        self
    }

    /// Only events accepted by a precondition may reach the pending scenario.
    #[must_use]
    pub fn precondition<I, S>(mut self, events: I, condition: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preconditions.push(PreconditionSpec {
            events: events.into_iter().map(Into::into).collect(),
            condition: condition.map(ConditionId::new),
        });
        self
    }

    /// Whether an event taken by one scenario is hidden from the pending one.
    #[must_use]
    pub const fn consuming(mut self, consuming: bool) -> Self {
        self.consuming = consuming;
        self
    }

    /// Whether several scenarios may run at once.
    #[must_use]
    pub const fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    /// Builds the FSM, expanding wildcards against the kernel event catalog.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` describing the first structural problem.
    pub fn build(self) -> Result<FsmDefinition, ValidationError> {
        self.build_with_catalog(EventCatalog::linux_kernel())
    }

    /// Builds the FSM against a caller-provided wildcard catalog.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` describing the first structural problem.
    pub fn build_with_catalog(mut self, catalog: EventCatalog) -> Result<FsmDefinition, ValidationError> {
        let fsm_id = self.id.trim().to_string();
        if fsm_id.is_empty() {
            return Err(ValidationError::EmptyFsmId);
        }
        if self.states.is_empty() {
            return Err(ValidationError::NoStates { fsm_id });
        }

        // Sentinel states need no declaration of their own.
        for sentinel in [&self.final_state, &self.abandon_state].into_iter().flatten() {
            if !self.states.iter().any(|s| &s.name == sentinel) {
                self.states.push(StateSpec::new(sentinel.clone()));
            }
        }

        let mut by_name: HashMap<String, StateId> = HashMap::with_capacity(self.states.len() + 1);
        for (i, spec) in self.states.iter().enumerate() {
            if spec.name == ERROR_STATE_NAME || by_name.insert(spec.name.clone(), StateId(i)).is_some() {
                return Err(ValidationError::DuplicateState {
                    fsm_id,
                    state: spec.name.clone(),
                });
            }
        }
        // The error state can be a transition target but never the start.
        let initial = match &self.initial {
            Some(name) => *by_name.get(name).ok_or_else(|| ValidationError::UndefinedInitialState {
                fsm_id: fsm_id.clone(),
                state: name.clone(),
            })?,
            None => StateId(0),
        };
        let error = StateId(self.states.len());
        by_name.insert(ERROR_STATE_NAME.to_string(), error);
        let resolve_sentinel = |role: &'static str, name: &Option<String>| -> Result<Option<StateId>, ValidationError> {
            name.as_ref()
                .map(|n| {
                    by_name.get(n).copied().ok_or_else(|| ValidationError::UndefinedSentinelState {
                        fsm_id: fsm_id.clone(),
                        role,
                        state: n.clone(),
                    })
                })
                .transpose()
        };
        let final_state = resolve_sentinel("final", &self.final_state)?;
        let abandon_state = resolve_sentinel("abandon", &self.abandon_state)?;

        let mut states = Vec::with_capacity(self.states.len() + 1);
        for (i, spec) in self.states.iter().enumerate() {
            let mut transitions = Vec::with_capacity(spec.transitions.len());
            for t in &spec.transitions {
                transitions.push(compile_transition(&fsm_id, &spec.name, t, &by_name)?);
            }
            states.push(State {
                id: StateId(i),
                name: spec.name.clone(),
                transitions,
            });
        }
        let restart = states[initial.0].transitions.clone();
        states.push(State {
            id: error,
            name: ERROR_STATE_NAME.to_string(),
            transitions: restart,
        });

        let mut preconditions = Vec::with_capacity(self.preconditions.len());
        for p in &self.preconditions {
            let patterns = p
                .events
                .iter()
                .map(|e| EventPattern::new(e.as_str()))
                .collect::<Result<Vec<_>, _>>()?;
            preconditions.push(Precondition {
                patterns,
                condition: p.condition.clone(),
            });
        }

        let indexes = FsmIndexes::build(&states, error, &catalog);

        Ok(FsmDefinition {
            id: fsm_id,
            states,
            by_name,
            initial,
            final_state,
            abandon_state,
            error,
            preconditions,
            consuming: self.consuming,
            multiple: self.multiple,
            catalog,
            indexes,
        })
    }
}

fn compile_transition(
    fsm_id: &str,
    state: &str,
    spec: &TransitionSpec,
    by_name: &HashMap<String, StateId>,
) -> Result<Transition, ValidationError> {
    if spec.events.is_empty() {
        return Err(ValidationError::EmptyEventSet {
            fsm_id: fsm_id.to_string(),
            state: state.to_string(),
        });
    }
    let target = *by_name.get(&spec.target).ok_or_else(|| ValidationError::DanglingTarget {
        fsm_id: fsm_id.to_string(),
        state: state.to_string(),
        target: spec.target.clone(),
    })?;
    let mut patterns = Vec::with_capacity(spec.events.len());
    for e in &spec.events {
        let pattern = EventPattern::new(e.as_str())?;
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }
    Ok(Transition {
        patterns,
        condition: spec.condition.clone(),
        actions: spec.actions.clone(),
        target,
    })
}

type CertaintyKey = (String, Option<ConditionId>);

#[derive(Debug, Clone, Default)]
struct FsmIndexes {
    /// Known concrete names (catalog plus literal patterns) to candidate states.
    by_event: HashMap<String, BTreeSet<StateId>>,
    /// Wildcards, consulted for names outside the known set.
    wildcards: Vec<(EventPattern, StateId)>,
    incoming: Vec<Vec<TransitionRef>>,
    certainty: HashMap<CertaintyKey, BTreeSet<StateId>>,
}

impl FsmIndexes {
    fn build(states: &[State], error: StateId, catalog: &EventCatalog) -> Self {
        let mut known: BTreeSet<&str> = catalog.names().collect();
        let mut wildcards = Vec::new();
        let mut seen_wildcards: HashSet<(&str, StateId)> = HashSet::new();
        for state in states.iter().filter(|s| s.id != error) {
            for t in &state.transitions {
                for p in &t.patterns {
                    if p.is_wildcard() {
                        if seen_wildcards.insert((p.as_str(), state.id)) {
                            wildcards.push((p.clone(), state.id));
                        }
                    } else {
                        known.insert(p.as_str());
                    }
                }
            }
        }

        let mut by_event: HashMap<String, BTreeSet<StateId>> = HashMap::new();
        for name in known {
            let accepting: BTreeSet<StateId> = states
                .iter()
                .filter(|s| s.id != error && s.transitions.iter().any(|t| t.matches_name(name)))
                .map(|s| s.id)
                .collect();
            if !accepting.is_empty() {
                by_event.insert(name.to_string(), accepting);
            }
        }

        let mut incoming = vec![Vec::new(); states.len()];
        let mut certainty: HashMap<CertaintyKey, BTreeSet<StateId>> = HashMap::new();
        for state in states {
            for (index, t) in state.transitions.iter().enumerate() {
                incoming[t.target.0].push(TransitionRef {
                    source: state.id,
                    index,
                });
                for p in &t.patterns {
                    certainty
                        .entry((p.as_str().to_string(), t.condition.clone()))
                        .or_default()
                        .insert(t.target);
                }
            }
        }

        Self {
            by_event,
            wildcards,
            incoming,
            certainty,
        }
    }
}

/// An immutable, validated FSM.
#[derive(Debug, Clone)]
pub struct FsmDefinition {
    id: String,
    states: Vec<State>,
    by_name: HashMap<String, StateId>,
    initial: StateId,
    final_state: Option<StateId>,
    abandon_state: Option<StateId>,
    error: StateId,
    preconditions: Vec<Precondition>,
    consuming: bool,
    multiple: bool,
    catalog: EventCatalog,
    indexes: FsmIndexes,
}

impl FsmDefinition {
    /// Starts a declarative description of an FSM.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> FsmSpec {
        FsmSpec::new(id)
    }

    /// The FSM id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All states, ERROR last.
    #[must_use]
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// States a scenario can be coherently in (everything but ERROR).
    pub fn coherence_states(&self) -> impl Iterator<Item = &State> {
        self.states.iter().filter(move |s| s.id != self.error)
    }

    /// Looks up a state by id.
    #[must_use]
    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.0)
    }

    /// Looks up a state id by name.
    #[must_use]
    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.by_name.get(name).copied()
    }

    /// Name of a state, `"?"` for an id outside this FSM.
    #[must_use]
    pub fn state_name(&self, id: StateId) -> &str {
        self.state(id).map_or("?", State::name)
    }

    /// The state new scenarios start in.
    #[must_use]
    pub const fn initial_state(&self) -> StateId {
        self.initial
    }

    /// The state that completes a scenario, if any.
    #[must_use]
    pub const fn final_state(&self) -> Option<StateId> {
        self.final_state
    }

    /// The state that abandons a scenario, if any.
    #[must_use]
    pub const fn abandon_state(&self) -> Option<StateId> {
        self.abandon_state
    }

    /// The error state, always the last one.
    #[must_use]
    pub const fn error_state(&self) -> StateId {
        self.error
    }

    /// Whether accepted events are hidden from the pending scenario.
    #[must_use]
    pub const fn is_consuming(&self) -> bool {
        self.consuming
    }

    /// Whether several scenarios may run at once.
    #[must_use]
    pub const fn allows_multiple(&self) -> bool {
        self.multiple
    }

    /// Names wildcard patterns expand to.
    #[must_use]
    pub const fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    /// Looks up a transition.
    #[must_use]
    pub fn transition(&self, t: TransitionRef) -> Option<&Transition> {
        self.state(t.source).and_then(|s| s.transitions.get(t.index))
    }

    /// Transitions entering `state`.
    #[must_use]
    pub fn incoming(&self, state: StateId) -> &[TransitionRef] {
        self.indexes.incoming.get(state.0).map_or(&[], Vec::as_slice)
    }

    /// First transition of `state`, in declaration order, accepting `event`.
    ///
    /// An unknown state is logged and treated as having no transition.
    pub fn next(
        &self,
        state: StateId,
        event: &TraceEvent,
        ctx: &ScenarioContext,
        evaluator: &dyn ConditionEvaluator,
    ) -> Option<TransitionRef> {
        let Some(current) = self.state(state) else {
            warn!(fsm = %self.id, state = %state, event = %event.name, "state not found, no transition taken");
            return None;
        };
        current
            .transitions
            .iter()
            .position(|t| t.accepts(event, ctx, evaluator))
            .map(|index| TransitionRef { source: state, index })
    }

    /// True if at least one precondition accepts the event (or none are declared).
    pub fn preconditions_accept(
        &self,
        event: &TraceEvent,
        ctx: &ScenarioContext,
        evaluator: &dyn ConditionEvaluator,
    ) -> bool {
        if self.preconditions.is_empty() {
            return true;
        }
        self.preconditions.iter().any(|p| {
            p.patterns.iter().any(|pat| pat.matches(&event.name))
                && p.condition.as_ref().map_or(true, |c| match evaluator.evaluate(c, event, ctx) {
                    Ok(v) => v,
                    Err(err) => {
                        warn!(fsm = %self.id, condition = %c, error = %err, "precondition evaluation failed");
                        false
                    }
                })
        })
    }

    /// States (never ERROR) having a transition whose pattern accepts `name`.
    ///
    /// Names known at build time are answered from the index; other names
    /// can only be matched by wildcards, which are scanned.
    #[must_use]
    pub fn candidate_states(&self, name: &str) -> Cow<'_, BTreeSet<StateId>> {
        if let Some(states) = self.indexes.by_event.get(name) {
            return Cow::Borrowed(states);
        }
        if self.catalog.contains(name) {
            return Cow::Owned(BTreeSet::new());
        }
        Cow::Owned(
            self.indexes
                .wildcards
                .iter()
                .filter(|(p, _)| p.matches(name))
                .map(|(_, s)| *s)
                .collect(),
        )
    }

    /// True if the taken transition, observed through `event_name`, could
    /// only have led to its own target.
    #[must_use]
    pub fn is_certain(&self, taken: TransitionRef, event_name: &str) -> bool {
        let Some(t) = self.transition(taken) else {
            return false;
        };
        let mut targets: BTreeSet<StateId> = BTreeSet::new();
        for p in t.patterns.iter().filter(|p| p.matches(event_name)) {
            if let Some(reachable) = self.indexes.certainty.get(&(p.as_str().to_string(), t.condition.clone())) {
                targets.extend(reachable.iter().copied());
            }
        }
        targets.len() == 1
    }

    /// Concrete event names a transition can stand for.
    #[must_use]
    pub fn event_names(&self, t: TransitionRef) -> Vec<String> {
        let Some(transition) = self.transition(t) else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for p in &transition.patterns {
            for name in self.catalog.expand(p) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, ConditionSet};

    fn simple() -> FsmDefinition {
        FsmDefinition::builder("proc")
            .state(StateSpec::new("S0").transition(TransitionSpec::on(["init"], "S1")))
            .state(StateSpec::new("S1").transition(TransitionSpec::on(["exit"], "S2")))
            .state(StateSpec::new("S2").transition(TransitionSpec::on(["start"], "S1")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_assigns_dense_ids() {
        let fsm = simple();
        assert_eq!(fsm.states().len(), 4);
        assert_eq!(fsm.state_id("S1"), Some(StateId(1)));
        assert_eq!(fsm.error_state(), StateId(3));
        assert_eq!(fsm.initial_state(), StateId(0));
        assert_eq!(fsm.coherence_states().count(), 3);
    }

    #[test]
    fn test_dangling_target_rejected() {
        let err = FsmDefinition::builder("f")
            .state(StateSpec::new("A").transition(TransitionSpec::on(["e"], "Z")))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::DanglingTarget { .. }));
    }

    #[test]
    fn test_undefined_initial_rejected() {
        let err = FsmDefinition::builder("f")
            .state(StateSpec::new("A"))
            .initial("B")
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::UndefinedInitialState { .. }));
    }

    #[test]
    fn test_error_state_cannot_be_initial() {
        let err = FsmDefinition::builder("f")
            .state(StateSpec::new("S0"))
            .initial(ERROR_STATE_NAME)
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::UndefinedInitialState { ref state, .. } if state == ERROR_STATE_NAME));

        let json = r##"{"id": "f", "states": [{"name": "S0"}], "initial": "#error"}"##;
        let spec: FsmSpec = serde_json::from_str(json).unwrap();
        assert!(spec.build().is_err());
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(
            FsmDefinition::builder(" ").state(StateSpec::new("A")).build(),
            Err(ValidationError::EmptyFsmId)
        ));
        assert!(matches!(
            FsmDefinition::builder("f").build(),
            Err(ValidationError::NoStates { .. })
        ));
        assert!(matches!(
            FsmDefinition::builder("f")
                .state(StateSpec::new("A"))
                .state(StateSpec::new("A"))
                .build(),
            Err(ValidationError::DuplicateState { .. })
        ));
        assert!(matches!(
            FsmDefinition::builder("f")
                .state(StateSpec::new("A").transition(TransitionSpec::on(Vec::<String>::new(), "A")))
                .build(),
            Err(ValidationError::EmptyEventSet { .. })
        ));
    }

    #[test]
    fn test_sentinels_created_on_demand() {
        let fsm = FsmDefinition::builder("f")
            .state(StateSpec::new("A").transition(TransitionSpec::on(["end"], "done")))
            .final_state("done")
            .build()
            .unwrap();
        assert_eq!(fsm.final_state(), fsm.state_id("done"));
    }

    #[test]
    fn test_error_state_restarts() {
        let fsm = simple();
        let set = ConditionSet::new();
        let ctx = ScenarioContext::default();
        let t = fsm.next(fsm.error_state(), &TraceEvent::new(0, "init", 1), &ctx, &set).unwrap();
        assert_eq!(fsm.transition(t).unwrap().target(), StateId(1));
        assert!(fsm.incoming(StateId(1)).contains(&t));
    }

    #[test]
    fn test_next_first_match_wins() {
        let set = ConditionSet::new().with("never", Condition::field_equals("x", 1));
        let fsm = FsmDefinition::builder("f")
            .state(
                StateSpec::new("A")
                    .transition(TransitionSpec::on(["e"], "B").when("never"))
                    .transition(TransitionSpec::on(["e"], "C"))
                    .transition(TransitionSpec::on(["e"], "B")),
            )
            .state(StateSpec::new("B"))
            .state(StateSpec::new("C"))
            .build()
            .unwrap();
        let t = fsm
            .next(StateId(0), &TraceEvent::new(0, "e", 1), &ScenarioContext::default(), &set)
            .unwrap();
        assert_eq!(t.index, 1);
    }

    #[test]
    fn test_next_unknown_state() {
        let fsm = simple();
        let r = fsm.next(
            StateId(99),
            &TraceEvent::new(0, "init", 1),
            &ScenarioContext::default(),
            &ConditionSet::new(),
        );
        assert!(r.is_none());
    }

    #[test]
    fn test_candidate_index_with_wildcards() {
        let fsm = FsmDefinition::builder("sys")
            .state(StateSpec::new("user").transition(TransitionSpec::on(["syscall_entry_.*"], "kernel")))
            .state(
                StateSpec::new("kernel")
                    .transition(TransitionSpec::on(["syscall_exit_.*"], "user"))
                    .transition(TransitionSpec::on(["syscall_entry_custom"], "kernel")),
            )
            .build()
            .unwrap();

        let open: Vec<StateId> = fsm.candidate_states("syscall_entry_open").iter().copied().collect();
        assert_eq!(open, vec![StateId(0)]);

        // Literal name outside the catalog still sees the wildcard.
        let custom: Vec<StateId> = fsm.candidate_states("syscall_entry_custom").iter().copied().collect();
        assert_eq!(custom, vec![StateId(0), StateId(1)]);

        // Unknown name, wildcard scan.
        let other: Vec<StateId> = fsm.candidate_states("syscall_exit_fancy").iter().copied().collect();
        assert_eq!(other, vec![StateId(1)]);

        assert!(fsm.candidate_states("sched_switch").is_empty());
    }

    #[test]
    fn test_certainty() {
        let fsm = FsmDefinition::builder("f")
            .state(
                StateSpec::new("A")
                    .transition(TransitionSpec::on(["go"], "B"))
                    .transition(TransitionSpec::on(["only"], "B")),
            )
            .state(StateSpec::new("B").transition(TransitionSpec::on(["go"], "C")))
            .state(StateSpec::new("C"))
            .build()
            .unwrap();
        let go = TransitionRef {
            source: StateId(0),
            index: 0,
        };
        let only = TransitionRef {
            source: StateId(0),
            index: 1,
        };
        assert!(!fsm.is_certain(go, "go"));
        assert!(fsm.is_certain(only, "only"));
    }

    #[test]
    fn test_preconditions() {
        let fsm = FsmDefinition::builder("f")
            .state(StateSpec::new("A").transition(TransitionSpec::on(["b"], "A")))
            .precondition(["sched_.*"], None)
            .build()
            .unwrap();
        let set = ConditionSet::new();
        let ctx = ScenarioContext::default();
        assert!(fsm.preconditions_accept(&TraceEvent::new(0, "sched_switch", 1), &ctx, &set));
        assert!(!fsm.preconditions_accept(&TraceEvent::new(0, "irq", 1), &ctx, &set));
    }

    #[test]
    fn test_spec_from_json() {
        let json = r#"{
            "id": "p",
            "states": [
                {"name": "S0", "transitions": [{"events": ["init"], "target": "S1"}]},
                {"name": "S1"}
            ],
            "final_state": "S1"
        }"#;
        let spec: FsmSpec = serde_json::from_str(json).unwrap();
        let fsm = spec.build().unwrap();
        assert!(fsm.is_consuming());
        assert!(fsm.allows_multiple());
        assert_eq!(fsm.final_state(), Some(StateId(1)));
    }
}
