//! Per-FSM coordination.
//!
//! An [`FsmCoordinator`] owns everything about one FSM during an analysis:
//! its scenario observers, the global transition counters, the field
//! history and the incoherence log. It is the only writer of all of them and
//! applies events strictly in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::action::ActionRegistry;
use crate::condition::ConditionEvaluator;
use crate::correlation::{CorrelationKey, CorrelationKeyResolver};
use crate::counters::TransitionCounters;
use crate::event::TraceEvent;
use crate::fsm::FsmDefinition;
use crate::history::FieldHistory;
use crate::incoherence::{Incoherence, IncoherenceLog};
use crate::inference::{FsmInference, InferenceContext, InferenceEngine, InferredEvent};
use crate::observer::{CoherenceAlgorithm, ObserverEnv, ScenarioObserver};
use crate::scenario::{Scenario, ScenarioId, ScenarioStatus};
use crate::time::Timestamp;

/// Drives every scenario of one FSM and owns the bookkeeping they share.
pub struct FsmCoordinator {
    fsm: Arc<FsmDefinition>,
    resolver: Arc<dyn CorrelationKeyResolver>,
    evaluator: Arc<dyn ConditionEvaluator>,
    actions: Arc<ActionRegistry>,
    algorithm: CoherenceAlgorithm,
    global: TransitionCounters,
    history: FieldHistory,
    observers: HashMap<ScenarioId, ScenarioObserver>,
    active: HashMap<CorrelationKey, ScenarioId>,
    pending: Option<ScenarioId>,
    created: usize,
    log: IncoherenceLog,
}

impl std::fmt::Debug for FsmCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsmCoordinator")
            .field("fsm", &self.fsm.id())
            .field("algorithm", &self.algorithm)
            .field("scenarios", &self.observers.len())
            .field("active", &self.active.len())
            .field("incoherences", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl FsmCoordinator {
    /// Creates a coordinator with no scenario yet.
    #[must_use]
    pub fn new(
        fsm: Arc<FsmDefinition>,
        resolver: Arc<dyn CorrelationKeyResolver>,
        evaluator: Arc<dyn ConditionEvaluator>,
        actions: Arc<ActionRegistry>,
        algorithm: CoherenceAlgorithm,
    ) -> Self {
        Self {
            fsm,
            resolver,
            evaluator,
            actions,
            algorithm,
            global: TransitionCounters::new(),
            history: FieldHistory::new(),
            observers: HashMap::new(),
            active: HashMap::new(),
            pending: None,
            created: 0,
            log: IncoherenceLog::new(),
        }
    }

    /// The FSM this coordinator drives.
    #[must_use]
    pub fn fsm(&self) -> &FsmDefinition {
        &self.fsm
    }

    /// The coherence checker in use.
    #[must_use]
    pub const fn algorithm(&self) -> CoherenceAlgorithm {
        self.algorithm
    }

    pub(crate) fn set_algorithm(&mut self, algorithm: CoherenceAlgorithm) {
        self.algorithm = algorithm;
    }

    /// Transition counters over every scenario.
    #[must_use]
    pub const fn global_counters(&self) -> &TransitionCounters {
        &self.global
    }

    /// Field values observed on events accepted by this FSM.
    #[must_use]
    pub const fn history(&self) -> &FieldHistory {
        &self.history
    }

    /// Recorded incoherences, in stream order.
    #[must_use]
    pub fn incoherences(&self) -> &[Incoherence] {
        self.log.as_slice()
    }

    /// Every scenario created so far, finished ones included.
    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.observers.values().map(ScenarioObserver::scenario)
    }

    /// Looks up a scenario by id.
    #[must_use]
    pub fn scenario(&self, id: ScenarioId) -> Option<&Scenario> {
        self.observers.get(&id).map(ScenarioObserver::scenario)
    }

    /// The running scenario following `key`, if any.
    #[must_use]
    pub fn active_scenario(&self, key: &CorrelationKey) -> Option<&Scenario> {
        self.active.get(key).and_then(|id| self.scenario(*id))
    }

    /// The scenario waiting for its first transition, if any.
    #[must_use]
    pub fn pending_scenario(&self) -> Option<&Scenario> {
        self.pending.and_then(|id| self.scenario(id))
    }

    /// Creates a pending scenario.
    ///
    /// Unless forced, a new one is only created for a multi-instance FSM that
    /// already started scenarios before and has none pending.
    pub fn create_scenario(&mut self, force: bool) -> Option<ScenarioId> {
        let allowed = force || (self.created > 0 && self.fsm.allows_multiple() && self.pending.is_none());
        if !allowed {
            return None;
        }
        let observer = ScenarioObserver::new(&self.fsm);
        let id = observer.scenario().id();
        self.observers.insert(id, observer);
        self.pending = Some(id);
        self.created += 1;
        debug!(fsm = %self.fsm.id(), scenario = %id, "scenario created");
        Some(id)
    }

    /// Applies one event to every scenario it concerns.
    pub fn handle_event(&mut self, event: &TraceEvent, checking: bool) {
        self.history.record(event);

        if event.is_lost_events() {
            for observer in self.observers.values_mut().filter(|o| o.scenario().is_active()) {
                observer.scenario_mut().mark_uncertain();
            }
            debug!(fsm = %self.fsm.id(), timestamp = %event.timestamp, "lost events, scenarios uncertain");
            return;
        }

        let keys = self.resolver.keys_for(event);
        let route = if keys.is_empty() {
            vec![CorrelationKey::global()]
        } else {
            keys.clone()
        };

        let mut env = ObserverEnv {
            fsm: self.fsm.as_ref(),
            checker: self.algorithm.checker(),
            evaluator: self.evaluator.as_ref(),
            actions: self.actions.as_ref(),
            global: &mut self.global,
            check: checking,
        };

        let mut taken = 0usize;
        for key in &route {
            let Some(id) = self.active.get(key).copied() else {
                continue;
            };
            let Some(observer) = self.observers.get_mut(&id) else {
                continue;
            };
            env.check = checking && taken < route.len();
            let outcome = observer.handle_event(event, &mut env);
            if outcome.transitioned {
                taken += 1;
            }
            if let Some(incoherence) = outcome.incoherence {
                self.log.insert(incoherence);
            }
            if !observer.scenario().is_active() {
                self.active.remove(key);
            }
        }

        let mut started = None;
        if let Some(id) = self.pending {
            if let Some(observer) = self.observers.get_mut(&id) {
                let consumed = taken > 0 && env.fsm.is_consuming();
                let eligible = !consumed
                    && env
                        .fsm
                        .preconditions_accept(event, observer.scenario().context(), env.evaluator);
                if eligible {
                    env.check = checking && taken < route.len();
                    observer.handle_event(event, &mut env);
                    if observer.scenario().status() != ScenarioStatus::Pending {
                        let key = self
                            .resolver
                            .scenario_key(event, &keys)
                            .unwrap_or_else(CorrelationKey::global);
                        for incoherence in observer.bind_key(env.fsm.id(), key.clone()) {
                            self.log.insert(incoherence);
                        }
                        started = Some((id, key, observer.scenario().is_active()));
                    }
                }
            }
        }

        if let Some((id, key, still_active)) = started {
            self.pending = None;
            debug!(fsm = %self.fsm.id(), scenario = %id, key = %key, "scenario bound to key");
            if still_active {
                if let Some(replaced) = self.active.insert(key, id) {
                    if let Some(old) = self.observers.get_mut(&replaced) {
                        old.scenario_mut().dispose();
                    }
                    debug!(fsm = %self.fsm.id(), scenario = %replaced, "scenario replaced by a newer one");
                }
            }
            self.create_scenario(false);
        }
    }

    /// Ends the analysis: running scenarios become abandoned and incoherences
    /// that never got a key are dropped.
    pub fn dispose(&mut self) {
        let mut dropped = 0;
        for observer in self.observers.values_mut() {
            dropped += observer.discard_buffered();
            observer.scenario_mut().dispose();
        }
        self.active.clear();
        self.pending = None;
        if dropped > 0 {
            debug!(fsm = %self.fsm.id(), dropped, "buffered incoherences discarded");
        }
    }

    /// Stops between events, discarding buffered incoherences. Returns how
    /// many were discarded.
    pub fn abort(&mut self) -> usize {
        let discarded: usize = self.observers.values_mut().map(ScenarioObserver::discard_buffered).sum();
        self.dispose();
        info!(fsm = %self.fsm.id(), discarded, "analysis aborted");
        discarded
    }

    pub(crate) fn infer(&mut self, engine: &InferenceEngine, trace_start: Timestamp) -> (FsmInference, Vec<InferredEvent>) {
        let ctx = InferenceContext {
            fsm: self.fsm.as_ref(),
            global: &self.global,
            history: &self.history,
            evaluator: self.evaluator.as_ref(),
            scenarios: &self.observers,
            trace_start,
        };
        engine.infer(&ctx, &mut self.log)
    }
}
