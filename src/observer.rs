//! Scenario observers and coherence checking.
//!
//! When a scenario cannot take any transition for an event, the observer asks
//! its [`CoherenceChecker`] whether some *other* state would have accepted the
//! event. If so the event is incoherent: something was missed between the last
//! accepted event and this one.
//!
//! Two checkers exist. [`NaiveChecker`] walks every state of the FSM.
//! [`OptimizedChecker`] only visits the states the event-name index lists for
//! the event. Both feed the same candidate collection, so they always agree.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::action::ActionRegistry;
use crate::condition::ConditionEvaluator;
use crate::correlation::CorrelationKey;
use crate::counters::TransitionCounters;
use crate::event::TraceEvent;
use crate::fsm::{FsmDefinition, State, StateId, TransitionKey, TransitionRef};
use crate::incoherence::{Incoherence, IncoherenceDraft};
use crate::scenario::{Scenario, ScenarioContext};

/// Which coherence checker to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceAlgorithm {
    /// Check every state.
    Naive,
    /// Check only states indexed for the event name.
    #[default]
    Optimized,
}

impl CoherenceAlgorithm {
    /// The checker implementing this algorithm.
    #[must_use]
    pub fn checker(self) -> &'static dyn CoherenceChecker {
        match self {
            Self::Naive => &NaiveChecker,
            Self::Optimized => &OptimizedChecker,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Optimized => "optimized",
        }
    }
}

impl fmt::Display for CoherenceAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a coherence check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoherenceVerdict {
    candidates: Vec<TransitionKey>,
}

impl CoherenceVerdict {
    /// Whether no other state accepts the event.
    #[must_use]
    pub fn is_coherent(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Transitions of other states accepting the event, in declaration order.
    #[must_use]
    pub fn candidates(&self) -> &[TransitionKey] {
        &self.candidates
    }

    fn into_candidates(self) -> Vec<TransitionKey> {
        self.candidates
    }
}

/// Decides whether an event the current state rejected is incoherent.
pub trait CoherenceChecker: Send + Sync {
    /// The algorithm this checker implements.
    fn algorithm(&self) -> CoherenceAlgorithm;

    /// Collects the transitions of other states that accept `event`.
    fn check(
        &self,
        fsm: &FsmDefinition,
        current: StateId,
        event: &TraceEvent,
        ctx: &ScenarioContext,
        evaluator: &dyn ConditionEvaluator,
    ) -> CoherenceVerdict;
}

impl fmt::Debug for dyn CoherenceChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoherenceChecker({})", self.algorithm())
    }
}

fn collect_candidates<'a>(
    fsm: &FsmDefinition,
    states: impl Iterator<Item = &'a State>,
    current: StateId,
    event: &TraceEvent,
    ctx: &ScenarioContext,
    evaluator: &dyn ConditionEvaluator,
) -> CoherenceVerdict {
    if fsm.next(current, event, ctx, evaluator).is_some() {
        return CoherenceVerdict::default();
    }
    let mut candidates = Vec::new();
    for state in states.filter(|s| s.id() != current) {
        for (index, t) in state.transitions().iter().enumerate() {
            if t.accepts(event, ctx, evaluator) {
                let taken = TransitionRef {
                    source: state.id(),
                    index,
                };
                candidates.push(TransitionKey::new(taken, event.name.as_str()));
            }
        }
    }
    CoherenceVerdict { candidates }
}

/// Scans every state for each rejected event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveChecker;

impl CoherenceChecker for NaiveChecker {
    fn algorithm(&self) -> CoherenceAlgorithm {
        CoherenceAlgorithm::Naive
    }

    fn check(
        &self,
        fsm: &FsmDefinition,
        current: StateId,
        event: &TraceEvent,
        ctx: &ScenarioContext,
        evaluator: &dyn ConditionEvaluator,
    ) -> CoherenceVerdict {
        collect_candidates(fsm, fsm.coherence_states(), current, event, ctx, evaluator)
    }
}

/// Scans only the states indexed under the event name.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimizedChecker;

impl CoherenceChecker for OptimizedChecker {
    fn algorithm(&self) -> CoherenceAlgorithm {
        CoherenceAlgorithm::Optimized
    }

    fn check(
        &self,
        fsm: &FsmDefinition,
        current: StateId,
        event: &TraceEvent,
        ctx: &ScenarioContext,
        evaluator: &dyn ConditionEvaluator,
    ) -> CoherenceVerdict {
        let indexed = fsm.candidate_states(&event.name);
        if indexed.is_empty() {
            return CoherenceVerdict::default();
        }
        let states = indexed.iter().filter_map(|id| fsm.state(*id));
        collect_candidates(fsm, states, current, event, ctx, evaluator)
    }
}

/// Everything an observer borrows from its coordinator for one event.
pub(crate) struct ObserverEnv<'a> {
    pub(crate) fsm: &'a FsmDefinition,
    pub(crate) checker: &'a dyn CoherenceChecker,
    pub(crate) evaluator: &'a dyn ConditionEvaluator,
    pub(crate) actions: &'a ActionRegistry,
    pub(crate) global: &'a mut TransitionCounters,
    /// Whether a rejected event may be checked for coherence.
    pub(crate) check: bool,
}

#[derive(Debug, Default)]
pub(crate) struct EventOutcome {
    pub(crate) transitioned: bool,
    pub(crate) incoherence: Option<Incoherence>,
}

/// A scenario plus its coherence bookkeeping.
#[derive(Debug, Clone)]
pub struct ScenarioObserver {
    scenario: Scenario,
    drafts: Vec<IncoherenceDraft>,
    last_accepted: Option<TraceEvent>,
}

impl ScenarioObserver {
    /// Creates an observer over a fresh pending scenario.
    #[must_use]
    pub fn new(fsm: &FsmDefinition) -> Self {
        Self {
            scenario: Scenario::new(fsm),
            drafts: Vec::new(),
            last_accepted: None,
        }
    }

    /// The observed scenario.
    #[must_use]
    pub const fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub(crate) fn scenario_mut(&mut self) -> &mut Scenario {
        &mut self.scenario
    }

    /// Incoherences waiting for the correlation key.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.drafts.len()
    }

    pub(crate) fn handle_event(&mut self, event: &TraceEvent, env: &mut ObserverEnv<'_>) -> EventOutcome {
        let mut outcome = EventOutcome::default();
        let current = self.scenario.state();

        if let Some(taken) = env.fsm.next(current, event, self.scenario.context(), env.evaluator) {
            self.take(taken, event, env);
            outcome.transitioned = true;
            return outcome;
        }
        if !env.check {
            return outcome;
        }

        let verdict = env
            .checker
            .check(env.fsm, current, event, self.scenario.context(), env.evaluator);
        if verdict.is_coherent() {
            return outcome;
        }

        let draft = IncoherenceDraft {
            event: event.clone(),
            previous_event: self.last_accepted.replace(event.clone()),
            state: current,
            state_name: env.fsm.state_name(current).to_string(),
            candidates: verdict.into_candidates(),
        };
        match self.scenario.key().cloned() {
            Some(key) => {
                debug!(
                    fsm = %env.fsm.id(),
                    key = %key,
                    event = %event.name,
                    timestamp = %event.timestamp,
                    state = %draft.state_name,
                    "incoherence recorded"
                );
                outcome.incoherence = Some(draft.complete(env.fsm.id(), self.scenario.id(), key));
            }
            None => self.drafts.push(draft),
        }

        let error = env.fsm.error_state();
        self.scenario.force_state(error);
        if let Some(taken) = env.fsm.next(error, event, self.scenario.context(), env.evaluator) {
            self.take(taken, event, env);
            outcome.transitioned = true;
        }
        outcome
    }

    fn take(&mut self, taken: TransitionRef, event: &TraceEvent, env: &mut ObserverEnv<'_>) {
        if let Some(t) = env.fsm.transition(taken) {
            for action in t.actions() {
                if let Err(err) = env.actions.execute(action, event, self.scenario.context_mut()) {
                    warn!(fsm = %env.fsm.id(), action = %action, error = %err, "action skipped");
                }
            }
        }
        env.global.increment(TransitionKey::new(taken, event.name.as_str()));
        self.scenario.apply_transition(env.fsm, taken, event);
        self.last_accepted = Some(event.clone());
    }

    /// Assigns the correlation key and releases the buffered incoherences.
    pub(crate) fn bind_key(&mut self, fsm_id: &str, key: CorrelationKey) -> Vec<Incoherence> {
        self.scenario.bind_key(key.clone());
        let id = self.scenario.id();
        self.drafts
            .drain(..)
            .map(|d| d.complete(fsm_id, id, key.clone()))
            .collect()
    }

    /// Drops the buffered incoherences, returning how many there were.
    pub(crate) fn discard_buffered(&mut self) -> usize {
        let n = self.drafts.len();
        self.drafts.clear();
        n
    }
}
