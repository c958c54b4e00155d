//! Incoherence inference.
//!
//! Runs once the stream is consumed. For every incoherence of an FSM, in
//! chronological order:
//!
//! 1. pick the candidate transition most likely to explain the event
//!    ([`best_transition`]),
//! 2. find the cheapest path from the last coherent state to that
//!    transition's source ([`shortest_path`]), where often-taken transitions
//!    are cheap,
//! 3. synthesize one [`InferredEvent`] per missing transition.
//!
//! Incoherences of one scenario chain: when an incoherence directly follows
//! the previous one, it starts from where the previous inferred path ended.

mod path;
mod policies;
mod resolver;
mod rules;
mod synthesis;

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::condition::ConditionEvaluator;
use crate::counters::TransitionCounters;
use crate::error::{CoherenceError, CoherenceResult};
use crate::fsm::{FsmDefinition, StateId};
use crate::history::FieldHistory;
use crate::incoherence::{InferredTransition, IncoherenceLog};
use crate::observer::ScenarioObserver;
use crate::scenario::{ScenarioContext, ScenarioId};
use crate::time::Timestamp;

pub use path::{representative_event, shortest_path, WeightedPath};
pub use policies::{StatisticsScope, TransitionStatistics};
pub use resolver::best_transition;
pub use rules::{FieldRule, FieldRuleTable};
pub use synthesis::{InferredEvent, InferredField};

/// Read-only view of one coordinator's state after the stream.
pub(crate) struct InferenceContext<'a> {
    pub(crate) fsm: &'a FsmDefinition,
    pub(crate) global: &'a TransitionCounters,
    pub(crate) history: &'a FieldHistory,
    pub(crate) evaluator: &'a dyn ConditionEvaluator,
    pub(crate) scenarios: &'a HashMap<ScenarioId, ScenarioObserver>,
    pub(crate) trace_start: Timestamp,
}

impl InferenceContext<'_> {
    fn local_counters(&self, id: ScenarioId) -> Option<&TransitionCounters> {
        self.scenarios.get(&id).map(|o| o.scenario().local_counters())
    }

    fn scenario_context(&self, id: ScenarioId) -> ScenarioContext {
        self.scenarios
            .get(&id)
            .map(|o| o.scenario().context().clone())
            .unwrap_or_default()
    }
}

/// Outcome of inference for one FSM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FsmInference {
    /// FSM id.
    pub fsm_id: String,
    /// Incoherences explained by an inferred path.
    pub resolved: usize,
    /// Incoherences no path explains.
    pub unresolved: usize,
    /// Number of events inferred.
    pub inferred_events: usize,
}

/// Resolves incoherences into inferred paths and events.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    scope: StatisticsScope,
    rules: FieldRuleTable,
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::new(StatisticsScope::default(), FieldRuleTable::linux_kernel())
    }
}

impl InferenceEngine {
    /// Creates an engine.
    #[must_use]
    pub const fn new(scope: StatisticsScope, rules: FieldRuleTable) -> Self {
        Self { scope, rules }
    }

    /// Counters consulted for scores and weights.
    #[must_use]
    pub const fn scope(&self) -> StatisticsScope {
        self.scope
    }

    /// Resolves every incoherence of `log`, replacing earlier results.
    pub(crate) fn infer(&self, ctx: &InferenceContext<'_>, log: &mut IncoherenceLog) -> (FsmInference, Vec<InferredEvent>) {
        let mut summary = FsmInference {
            fsm_id: ctx.fsm.id().to_string(),
            resolved: 0,
            unresolved: 0,
            inferred_events: 0,
        };
        let mut events = Vec::new();
        // Per scenario: incoherent-event timestamp and where its path ended.
        let mut previous: HashMap<ScenarioId, (Timestamp, Option<StateId>)> = HashMap::new();

        for inc in log.iter_mut() {
            inc.reset();
            let stats = TransitionStatistics::new(self.scope, ctx.global, ctx.local_counters(inc.scenario()));

            let mut start = inc.state();
            if let (Some((at, Some(end))), Some(prev)) = (previous.get(&inc.scenario()), inc.previous_event()) {
                if prev.timestamp == *at {
                    start = *end;
                }
            }

            let resolved = best_transition(inc.candidates(), &stats).and_then(|chosen| {
                let explained = chosen.transition();
                let target = ctx.fsm.transition(explained)?.target();
                let path = shortest_path(ctx.fsm, start, chosen.source, |e| stats.edge_weight(e))?;
                let mut steps: Vec<InferredTransition> = path
                    .edges
                    .iter()
                    .filter_map(|&edge| {
                        ctx.fsm.transition(edge).map(|t| InferredTransition {
                            transition: edge,
                            event: representative_event(ctx.fsm, edge, ctx.global),
                            target: t.target(),
                        })
                    })
                    .collect();
                steps.push(InferredTransition {
                    transition: explained,
                    event: chosen.event.clone(),
                    target,
                });
                Some(steps)
            });

            match resolved {
                Some(steps) => {
                    inc.resolve(steps);
                    let synthesized = synthesis::synthesize(inc, ctx, &self.rules);
                    debug!(
                        fsm = %summary.fsm_id,
                        key = %inc.key(),
                        event = %inc.event().name,
                        inferred = synthesized.len(),
                        "incoherence resolved"
                    );
                    summary.resolved += 1;
                    summary.inferred_events += synthesized.len();
                    events.extend(synthesized);
                }
                None => {
                    inc.resolve(Vec::new());
                    warn!(
                        fsm = %summary.fsm_id,
                        key = %inc.key(),
                        event = %inc.event().name,
                        state = %inc.state_name(),
                        "no path explains incoherence"
                    );
                    summary.unresolved += 1;
                }
            }
            previous.insert(inc.scenario(), (inc.timestamp(), inc.final_target()));
        }

        (summary, events)
    }
}

/// All inferred events of an analysis, chronologically sorted, with a digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceReport {
    fsms: Vec<FsmInference>,
    events: Vec<InferredEvent>,
    digest: String,
}

impl InferenceReport {
    pub(crate) fn assemble(fsms: Vec<FsmInference>, mut events: Vec<InferredEvent>) -> CoherenceResult<Self> {
        events.sort_by(InferredEvent::chronological_cmp);
        let digest = Self::compute_digest(&events)?;
        Ok(Self { fsms, events, digest })
    }

    /// blake3 digest (hex) of the serialized event list.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the events cannot be serialized.
    pub fn compute_digest(events: &[InferredEvent]) -> CoherenceResult<String> {
        let bytes = serde_json::to_vec(events)
            .map_err(|e| CoherenceError::internal(format!("cannot serialize inferred events: {e}")))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Per-FSM outcome.
    #[must_use]
    pub fn fsms(&self) -> &[FsmInference] {
        &self.fsms
    }

    /// Inferred events ordered by timestamp.
    #[must_use]
    pub fn events(&self) -> &[InferredEvent] {
        &self.events
    }

    pub(crate) fn events_mut(&mut self) -> &mut [InferredEvent] {
        &mut self.events
    }

    /// Digest of the events as they were inferred, before any choice changed.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Total resolved incoherences.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.fsms.iter().map(|f| f.resolved).sum()
    }

    /// Total unresolved incoherences.
    #[must_use]
    pub fn unresolved(&self) -> usize {
        self.fsms.iter().map(|f| f.unresolved).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report() {
        let report = InferenceReport::assemble(Vec::new(), Vec::new()).unwrap();
        assert!(report.events().is_empty());
        assert_eq!(report.resolved(), 0);
        assert_eq!(report.digest().len(), 64);
        assert_eq!(report.digest(), InferenceReport::compute_digest(&[]).unwrap());
    }

    #[test]
    fn test_default_engine_scope() {
        let engine = InferenceEngine::default();
        assert_eq!(engine.scope(), StatisticsScope::LocalWithGlobalFallback);
    }
}
