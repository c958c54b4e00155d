//! The analysis entry point.
//!
//! A [`CoherenceAnalyzer`] feeds an ordered event stream to one
//! [`FsmCoordinator`] per registered FSM, then infers the events the trace
//! most likely lost.
//!
//! ```
//! use tracecoherence::{
//!     CancellationToken, CoherenceAnalyzer, FieldKeyResolver, FsmDefinition, StateSpec,
//!     TraceEvent, TransitionSpec,
//! };
//!
//! let fsm = FsmDefinition::builder("proc")
//!     .state(StateSpec::new("S0").transition(TransitionSpec::on(["init"], "S1")))
//!     .state(StateSpec::new("S1").transition(TransitionSpec::on(["exit"], "S2")))
//!     .state(StateSpec::new("S2").transition(TransitionSpec::on(["start"], "S1")))
//!     .build()
//!     .unwrap();
//!
//! let mut analyzer = CoherenceAnalyzer::builder()
//!     .fsm(fsm, FieldKeyResolver::new(["tid"]))
//!     .build()
//!     .unwrap();
//!
//! let events = vec![
//!     TraceEvent::new(1, "init", 5).with_field("tid", 1),
//!     TraceEvent::new(2, "exit", 9).with_field("tid", 1),
//!     TraceEvent::new(3, "start", 13).with_field("tid", 1),
//!     TraceEvent::new(4, "start", 19).with_field("tid", 1),
//! ];
//! analyzer.run(events, &CancellationToken::new()).unwrap();
//!
//! let report = analyzer.compute_inferences().unwrap();
//! assert_eq!(report.events().len(), 1);
//! assert_eq!(report.events()[0].name(), "exit");
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use tracing::{debug, info, warn};

use crate::action::ActionRegistry;
use crate::condition::{ConditionEvaluator, ConditionSet};
use crate::config::AnalysisConfig;
use crate::coordinator::FsmCoordinator;
use crate::correlation::CorrelationKeyResolver;
use crate::error::{CoherenceError, CoherenceResult, ExecutionError, ValidationError};
use crate::event::TraceEvent;
use crate::fsm::FsmDefinition;
use crate::incoherence::Incoherence;
use crate::inference::{FieldRuleTable, FsmInference, InferenceEngine, InferenceReport, InferredEvent};
use crate::observer::CoherenceAlgorithm;
use crate::time::Timestamp;

/// Shared flag that stops [`CoherenceAnalyzer::run`] between two events.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// What a [`CoherenceAnalyzer::run`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Events applied to the FSMs.
    pub processed: u64,
    /// Events rejected with a recoverable error, such as out-of-order ones.
    pub skipped: u64,
    /// Whether the run stopped on the cancellation token.
    pub cancelled: bool,
    /// Incoherences dropped because they never got a correlation key.
    pub discarded_incoherences: usize,
}

type FsmRegistration = (FsmDefinition, Arc<dyn CorrelationKeyResolver>);

/// Builder for [`CoherenceAnalyzer`].
pub struct CoherenceAnalyzerBuilder {
    config: AnalysisConfig,
    fsms: Vec<FsmRegistration>,
    evaluator: Arc<dyn ConditionEvaluator>,
    actions: ActionRegistry,
    initial: Option<Vec<String>>,
    rules: FieldRuleTable,
}

impl Default for CoherenceAnalyzerBuilder {
    fn default() -> Self {
        Self {
            config: AnalysisConfig::default(),
            fsms: Vec::new(),
            evaluator: Arc::new(ConditionSet::new()),
            actions: ActionRegistry::new(),
            initial: None,
            rules: FieldRuleTable::linux_kernel(),
        }
    }
}

impl std::fmt::Debug for CoherenceAnalyzerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoherenceAnalyzerBuilder")
            .field("config", &self.config)
            .field("fsms", &self.fsms.iter().map(|(fsm, _)| fsm.id()).collect::<Vec<_>>())
            .field("initial", &self.initial)
            .finish_non_exhaustive()
    }
}

impl CoherenceAnalyzerBuilder {
    /// Sets the analysis configuration.
    #[must_use]
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers an FSM and the resolver that routes events to its scenarios.
    #[must_use]
    pub fn fsm<R>(mut self, fsm: FsmDefinition, resolver: R) -> Self
    where
        R: CorrelationKeyResolver + 'static,
    {
        let resolver: Arc<dyn CorrelationKeyResolver> = Arc::new(resolver);
        self.fsms.push((fsm, resolver));
        self
    }

    /// Sets the evaluator every FSM uses for its named conditions.
    #[must_use]
    pub fn conditions<E>(mut self, evaluator: E) -> Self
    where
        E: ConditionEvaluator + 'static,
    {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Sets the actions transitions may reference.
    #[must_use]
    pub fn actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    /// FSMs whose first scenario is created up front. Defaults to all.
    #[must_use]
    pub fn initial_fsms<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Content rules for inferred events. Defaults to the kernel table.
    #[must_use]
    pub fn field_rules(mut self, rules: FieldRuleTable) -> Self {
        self.rules = rules;
        self
    }

    /// Validates the registrations and creates the analyzer.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the configuration is out of range
    /// - `DuplicateFsm` if two FSMs share an id
    /// - `UnknownInitialFsm` if an initial FSM was never registered
    pub fn build(self) -> Result<CoherenceAnalyzer, ValidationError> {
        self.config.validate()?;

        let mut index = HashMap::with_capacity(self.fsms.len());
        for (position, (fsm, _)) in self.fsms.iter().enumerate() {
            if index.insert(fsm.id().to_string(), position).is_some() {
                return Err(ValidationError::DuplicateFsm {
                    fsm_id: fsm.id().to_string(),
                });
            }
        }
        if let Some(initial) = &self.initial {
            if let Some(missing) = initial.iter().find(|id| !index.contains_key(id.as_str())) {
                return Err(ValidationError::UnknownInitialFsm {
                    fsm_id: missing.clone(),
                });
            }
        }

        let actions = Arc::new(self.actions);
        let algorithm = self.config.algorithm;
        let mut coordinators: Vec<FsmCoordinator> = self
            .fsms
            .into_iter()
            .map(|(fsm, resolver)| {
                FsmCoordinator::new(
                    Arc::new(fsm),
                    resolver,
                    Arc::clone(&self.evaluator),
                    Arc::clone(&actions),
                    algorithm,
                )
            })
            .collect();

        for coordinator in &mut coordinators {
            let starts = self
                .initial
                .as_ref()
                .map_or(true, |ids| ids.iter().any(|id| id == coordinator.fsm().id()));
            if starts {
                coordinator.create_scenario(true);
            }
        }

        info!(
            fsms = coordinators.len(),
            algorithm = %algorithm,
            scope = self.config.statistics_scope.name(),
            "coherence analyzer ready"
        );

        Ok(CoherenceAnalyzer {
            checking: self.config.checks_from_start(),
            engine: InferenceEngine::new(self.config.statistics_scope, self.rules),
            config: self.config,
            coordinators,
            index,
            trace_start: None,
            last_timestamp: None,
            processed: 0,
            report: None,
        })
    }
}

/// Checks a trace against a set of FSMs and infers its missing events.
#[derive(Debug)]
pub struct CoherenceAnalyzer {
    config: AnalysisConfig,
    coordinators: Vec<FsmCoordinator>,
    index: HashMap<String, usize>,
    engine: InferenceEngine,
    checking: bool,
    trace_start: Option<Timestamp>,
    last_timestamp: Option<Timestamp>,
    processed: u64,
    report: Option<InferenceReport>,
}

impl CoherenceAnalyzer {
    /// Starts building an analyzer.
    #[must_use]
    pub fn builder() -> CoherenceAnalyzerBuilder {
        CoherenceAnalyzerBuilder::default()
    }

    /// The configuration the analyzer was built with.
    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Number of events applied so far.
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.processed
    }

    /// Whether incoherences are currently being detected.
    #[must_use]
    pub const fn is_checking(&self) -> bool {
        self.checking
    }

    /// Timestamp of the first event, if any arrived.
    #[must_use]
    pub const fn trace_start(&self) -> Option<Timestamp> {
        self.trace_start
    }

    /// The coordinator of one FSM.
    #[must_use]
    pub fn coordinator(&self, fsm_id: &str) -> Option<&FsmCoordinator> {
        self.index.get(fsm_id).and_then(|&i| self.coordinators.get(i))
    }

    /// All coordinators, in registration order.
    pub fn coordinators(&self) -> impl Iterator<Item = &FsmCoordinator> {
        self.coordinators.iter()
    }

    /// Applies one event to every FSM.
    ///
    /// # Errors
    ///
    /// Returns `EventOutOfOrder` if the event is older than the previous one;
    /// the event is then ignored.
    pub fn handle_event(&mut self, event: &TraceEvent) -> CoherenceResult<()> {
        if let Some(previous) = self.last_timestamp {
            if event.timestamp < previous {
                return Err(ExecutionError::EventOutOfOrder {
                    previous,
                    current: event.timestamp,
                }
                .into());
            }
        }
        self.last_timestamp = Some(event.timestamp);
        self.trace_start.get_or_insert(event.timestamp);
        self.processed += 1;
        self.report = None;

        if event.is_lost_events() && !self.checking {
            self.checking = true;
            info!(timestamp = %event.timestamp, "lost events reported, coherence checking enabled");
        }

        let checking = self.checking;
        for coordinator in &mut self.coordinators {
            coordinator.handle_event(event, checking);
        }
        Ok(())
    }

    /// Incoherences recorded for an FSM, ordered by event.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFsm` if no FSM has this id.
    pub fn incoherences(&self, fsm_id: &str) -> CoherenceResult<&[Incoherence]> {
        self.coordinator(fsm_id)
            .map(FsmCoordinator::incoherences)
            .ok_or_else(|| {
                ExecutionError::UnknownFsm {
                    fsm_id: fsm_id.to_string(),
                }
                .into()
            })
    }

    /// Switches the coherence checker of every FSM.
    ///
    /// # Errors
    ///
    /// Returns `AlgorithmLocked` once an event has been processed.
    pub fn select_algorithm(&mut self, algorithm: CoherenceAlgorithm) -> CoherenceResult<()> {
        if self.processed > 0 {
            return Err(ExecutionError::AlgorithmLocked.into());
        }
        self.config.algorithm = algorithm;
        for coordinator in &mut self.coordinators {
            coordinator.set_algorithm(algorithm);
        }
        debug!(algorithm = %algorithm, "coherence algorithm selected");
        Ok(())
    }

    /// Resolves every incoherence and synthesizes the inferred events.
    ///
    /// Each call starts from scratch, so choices made on ambiguous fields of
    /// an earlier report are lost.
    ///
    /// # Errors
    ///
    /// Returns `InferenceWorker` if a parallel worker fails, or an internal
    /// error if the report cannot be digested.
    pub fn compute_inferences(&mut self) -> CoherenceResult<&InferenceReport> {
        let results = if self.config.parallel_inference && self.coordinators.len() > 1 {
            self.infer_parallel()?
        } else {
            let trace_start = self.trace_start.unwrap_or_default();
            let engine = &self.engine;
            self.coordinators
                .iter_mut()
                .map(|c| c.infer(engine, trace_start))
                .collect()
        };

        let (fsms, events): (Vec<FsmInference>, Vec<Vec<InferredEvent>>) = results.into_iter().unzip();
        let report = InferenceReport::assemble(fsms, events.into_iter().flatten().collect())?;
        info!(
            resolved = report.resolved(),
            unresolved = report.unresolved(),
            inferred = report.events().len(),
            digest = %report.digest(),
            "inference complete"
        );
        Ok(&*self.report.insert(report))
    }

    fn infer_parallel(&mut self) -> CoherenceResult<Vec<(FsmInference, Vec<InferredEvent>)>> {
        let total = self.coordinators.len();
        let workers = self.config.inference_workers.clamp(1, total);
        let chunk = total.div_ceil(workers);
        let trace_start = self.trace_start.unwrap_or_default();
        let engine = &self.engine;
        let (tx, rx) = unbounded();

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            let mut failure = None;
            for (worker, coordinators) in self.coordinators.chunks_mut(chunk).enumerate() {
                let tx = tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("tracecoherence-infer-{worker}"))
                    .spawn_scoped(scope, move || {
                        for (offset, coordinator) in coordinators.iter_mut().enumerate() {
                            let result = coordinator.infer(engine, trace_start);
                            if tx.send((worker * chunk + offset, result)).is_err() {
                                break;
                            }
                        }
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        failure = Some(format!("cannot spawn worker {worker}: {e}"));
                        break;
                    }
                }
            }
            for handle in handles {
                if handle.join().is_err() && failure.is_none() {
                    failure = Some("worker panicked".to_string());
                }
            }
            failure.map_or(Ok(()), |message| Err(ExecutionError::InferenceWorker { message }))
        })?;
        drop(tx);

        let mut slots: Vec<Option<(FsmInference, Vec<InferredEvent>)>> = (0..total).map(|_| None).collect();
        for (position, result) in rx.iter() {
            if let Some(slot) = slots.get_mut(position) {
                *slot = Some(result);
            }
        }
        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CoherenceError::internal("an FSM is missing from the inference results"))
    }

    /// The last computed report, if no event arrived since.
    #[must_use]
    pub const fn report(&self) -> Option<&InferenceReport> {
        self.report.as_ref()
    }

    /// Inferred events of the last report, chronologically sorted.
    #[must_use]
    pub fn inferred_events(&self) -> &[InferredEvent] {
        self.report.as_ref().map(InferenceReport::events).unwrap_or_default()
    }

    /// Mutable access for choosing among the candidates of ambiguous fields.
    pub fn inferred_events_mut(&mut self) -> &mut [InferredEvent] {
        self.report.as_mut().map(InferenceReport::events_mut).unwrap_or_default()
    }

    /// Inferred events with at least one ambiguous field.
    #[must_use]
    pub fn multi_inferred_events(&self) -> Vec<&InferredEvent> {
        self.inferred_events().iter().filter(|e| e.is_multi()).collect()
    }

    /// Whether any inferred event has an ambiguous field.
    #[must_use]
    pub fn has_multi_inferred_events(&self) -> bool {
        self.inferred_events().iter().any(InferredEvent::is_multi)
    }

    /// Feeds `events` in order until exhausted or `cancel` is set.
    ///
    /// Out-of-order events are logged and skipped. On exhaustion the scenarios
    /// are disposed; on cancellation the analysis is aborted.
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable error.
    pub fn run<I>(&mut self, events: I, cancel: &CancellationToken) -> CoherenceResult<RunSummary>
    where
        I: IntoIterator<Item = TraceEvent>,
    {
        let mut summary = RunSummary::default();
        for event in events {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                summary.discarded_incoherences = self.abort();
                return Ok(summary);
            }
            match self.handle_event(&event) {
                Ok(()) => summary.processed += 1,
                Err(err) if err.is_recoverable() => {
                    warn!(rank = event.id.rank(), name = %event.name, error = %err, "event skipped");
                    summary.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        self.dispose();
        Ok(summary)
    }

    /// Ends the analysis: running scenarios are abandoned.
    pub fn dispose(&mut self) {
        for coordinator in &mut self.coordinators {
            coordinator.dispose();
        }
    }

    /// Stops the analysis and returns how many buffered incoherences were
    /// discarded.
    pub fn abort(&mut self) -> usize {
        self.coordinators.iter_mut().map(FsmCoordinator::abort).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckingMode;
    use crate::correlation::FieldKeyResolver;
    use crate::fsm::{StateSpec, TransitionSpec};
    use crate::scenario::ScenarioStatus;

    fn process_fsm(id: &str) -> FsmDefinition {
        FsmDefinition::builder(id)
            .state(StateSpec::new("S0").transition(TransitionSpec::on(["init"], "S1")))
            .state(StateSpec::new("S1").transition(TransitionSpec::on(["exit"], "S2")))
            .state(StateSpec::new("S2").transition(TransitionSpec::on(["start"], "S1")))
            .build()
            .unwrap()
    }

    fn analyzer(config: AnalysisConfig) -> CoherenceAnalyzer {
        CoherenceAnalyzer::builder()
            .config(config)
            .fsm(process_fsm("proc"), FieldKeyResolver::new(["tid"]))
            .build()
            .unwrap()
    }

    fn ev(rank: u64, name: &str, ts: u64) -> TraceEvent {
        TraceEvent::new(rank, name, ts).with_field("tid", 1).with_field("cpu", 2)
    }

    fn missing_exit() -> Vec<TraceEvent> {
        vec![ev(1, "init", 5), ev(2, "exit", 9), ev(3, "start", 13), ev(4, "start", 19)]
    }

    #[test]
    fn test_duplicate_fsm_rejected() {
        let err = CoherenceAnalyzer::builder()
            .fsm(process_fsm("proc"), FieldKeyResolver::new(["tid"]))
            .fsm(process_fsm("proc"), FieldKeyResolver::new(["tid"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateFsm { .. }));
    }

    #[test]
    fn test_unknown_initial_fsm_rejected() {
        let err = CoherenceAnalyzer::builder()
            .fsm(process_fsm("proc"), FieldKeyResolver::new(["tid"]))
            .initial_fsms(["cpu"])
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownInitialFsm { .. }));
    }

    #[test]
    fn test_non_initial_fsm_stays_idle() {
        let mut analyzer = CoherenceAnalyzer::builder()
            .fsm(process_fsm("a"), FieldKeyResolver::new(["tid"]))
            .fsm(process_fsm("b"), FieldKeyResolver::new(["tid"]))
            .initial_fsms(["a"])
            .build()
            .unwrap();
        analyzer.handle_event(&ev(1, "init", 1)).unwrap();
        assert_eq!(analyzer.coordinator("a").unwrap().scenarios().count(), 2);
        assert_eq!(analyzer.coordinator("b").unwrap().scenarios().count(), 0);
    }

    #[test]
    fn test_out_of_order_event_rejected() {
        let mut analyzer = analyzer(AnalysisConfig::default());
        analyzer.handle_event(&ev(1, "init", 10)).unwrap();
        let err = analyzer.handle_event(&ev(2, "exit", 5)).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(analyzer.processed(), 1);
    }

    #[test]
    fn test_unknown_fsm_query() {
        let analyzer = analyzer(AnalysisConfig::default());
        assert!(analyzer.incoherences("proc").unwrap().is_empty());
        assert!(analyzer.incoherences("nope").is_err());
    }

    #[test]
    fn test_algorithm_locked_after_first_event() {
        let mut analyzer = analyzer(AnalysisConfig::default());
        analyzer.select_algorithm(CoherenceAlgorithm::Naive).unwrap();
        assert_eq!(analyzer.coordinator("proc").unwrap().algorithm(), CoherenceAlgorithm::Naive);
        analyzer.handle_event(&ev(1, "init", 1)).unwrap();
        assert!(analyzer.select_algorithm(CoherenceAlgorithm::Optimized).is_err());
    }

    #[test]
    fn test_missing_exit_is_inferred() {
        let mut analyzer = analyzer(AnalysisConfig::default());
        let summary = analyzer.run(missing_exit(), &CancellationToken::new()).unwrap();
        assert_eq!(summary.processed, 4);
        assert!(!summary.cancelled);

        let report = analyzer.compute_inferences().unwrap();
        assert_eq!(report.resolved(), 1);
        let inferred = &report.events()[0];
        assert_eq!(inferred.name(), "exit");
        assert_eq!(inferred.timestamp(), Timestamp::new(16));
        assert_eq!(inferred.local_rank(), 1);
        assert!(!analyzer.has_multi_inferred_events());
    }

    #[test]
    fn test_run_disposes_scenarios() {
        let mut analyzer = analyzer(AnalysisConfig::default());
        analyzer
            .run(vec![ev(1, "init", 1)], &CancellationToken::new())
            .unwrap();
        let statuses: Vec<ScenarioStatus> = analyzer
            .coordinator("proc")
            .unwrap()
            .scenarios()
            .map(|s| s.status())
            .collect();
        assert!(statuses.iter().all(|s| !s.is_active()));
        assert!(statuses.contains(&ScenarioStatus::Abandoned));
    }

    #[test]
    fn test_cancelled_run() {
        let mut analyzer = analyzer(AnalysisConfig::default());
        let token = CancellationToken::new();
        token.cancel();
        let summary = analyzer.run(missing_exit(), &token).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.processed, 0);
        assert_eq!(analyzer.processed(), 0);
    }

    #[test]
    fn test_checking_starts_after_lost_events() {
        let config = AnalysisConfig {
            checking: CheckingMode::AfterFirstLostEvent,
            ..AnalysisConfig::default()
        };
        let mut analyzer = analyzer(config);
        analyzer.handle_event(&ev(1, "init", 1)).unwrap();
        analyzer.handle_event(&ev(2, "start", 2)).unwrap();
        assert!(!analyzer.is_checking());
        assert!(analyzer.incoherences("proc").unwrap().is_empty());

        analyzer.handle_event(&TraceEvent::lost(3, 3)).unwrap();
        assert!(analyzer.is_checking());
        analyzer.handle_event(&ev(4, "start", 4)).unwrap();
        assert_eq!(analyzer.incoherences("proc").unwrap().len(), 1);
    }

    #[test]
    fn test_parallel_inference_matches_sequential() {
        let build = |parallel: bool| {
            let config = AnalysisConfig {
                parallel_inference: parallel,
                inference_workers: 2,
                ..AnalysisConfig::default()
            };
            let mut analyzer = CoherenceAnalyzer::builder()
                .config(config)
                .fsm(process_fsm("a"), FieldKeyResolver::new(["tid"]))
                .fsm(process_fsm("b"), FieldKeyResolver::new(["tid"]))
                .fsm(process_fsm("c"), FieldKeyResolver::new(["tid"]))
                .build()
                .unwrap();
            analyzer.run(missing_exit(), &CancellationToken::new()).unwrap();
            analyzer.compute_inferences().unwrap().clone()
        };
        let sequential = build(false);
        let parallel = build(true);
        assert_eq!(sequential.events().len(), 3);
        assert_eq!(sequential.digest(), parallel.digest());
        assert_eq!(sequential.fsms(), parallel.fsms());
    }

    #[test]
    fn test_new_event_invalidates_report() {
        let mut analyzer = analyzer(AnalysisConfig::default());
        for event in missing_exit() {
            analyzer.handle_event(&event).unwrap();
        }
        analyzer.compute_inferences().unwrap();
        assert!(analyzer.report().is_some());
        analyzer.handle_event(&ev(5, "exit", 30)).unwrap();
        assert!(analyzer.report().is_none());
        assert!(analyzer.inferred_events().is_empty());
    }
}
