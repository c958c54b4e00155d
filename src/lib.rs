//! # tracecoherence - coherence checking of trace event streams
//!
//! Checks an ordered stream of trace events against user-defined finite-state
//! machines and, where the stream contradicts them, infers the events the
//! trace most likely lost.
//!
//! ## Core Concepts
//!
//! - **FSM**: a pattern of expected events for one logical entity, such as a thread
//! - **Scenario**: one live instance of an FSM following one correlation key
//! - **Incoherence**: an event the scenario's state does not accept but another state does
//! - **Inferred event**: a synthetic event filling the gap before an incoherence
//!
//! ## Usage
//!
//! ```rust
//! use tracecoherence::{
//!     CancellationToken, CoherenceAnalyzer, FieldKeyResolver, FsmDefinition, StateSpec,
//!     TraceEvent, TransitionSpec,
//! };
//!
//! let fsm = FsmDefinition::builder("thread")
//!     .state(StateSpec::new("idle").transition(TransitionSpec::on(["wake"], "running")))
//!     .state(StateSpec::new("running").transition(TransitionSpec::on(["sleep"], "idle")))
//!     .build()?;
//!
//! let mut analyzer = CoherenceAnalyzer::builder()
//!     .fsm(fsm, FieldKeyResolver::new(["tid"]))
//!     .build()?;
//!
//! let events = vec![
//!     TraceEvent::new(1, "wake", 10).with_field("tid", 7),
//!     TraceEvent::new(2, "wake", 20).with_field("tid", 7),
//! ];
//! analyzer.run(events, &CancellationToken::new())?;
//!
//! assert_eq!(analyzer.incoherences("thread")?.len(), 1);
//! let report = analyzer.compute_inferences()?;
//! assert_eq!(report.events()[0].name(), "sleep");
//! # Ok::<(), tracecoherence::CoherenceError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod event;
pub mod pattern;
pub mod time;
pub mod value;

// FSM model
pub mod action;
pub mod condition;
pub mod fsm;

// Stream processing
pub mod correlation;
pub mod counters;
pub mod history;
pub mod incoherence;
pub mod observer;
pub mod scenario;

// Analysis
pub mod analyzer;
pub mod config;
pub mod coordinator;
pub mod inference;

// Re-export primary types at crate root for convenience
pub use action::{Action, ActionId, ActionRegistry};
pub use analyzer::{CancellationToken, CoherenceAnalyzer, CoherenceAnalyzerBuilder, RunSummary};
pub use condition::{
    CompareOp, Condition, ConditionEvaluator, ConditionId, ConditionSet, FieldConstraint, Operand,
};
pub use config::{AnalysisConfig, CheckingMode};
pub use coordinator::FsmCoordinator;
pub use correlation::{CorrelationKey, CorrelationKeyResolver, FieldKeyResolver, GlobalKeyResolver};
pub use counters::TransitionCounters;
pub use error::{CoherenceError, CoherenceResult, ExecutionError, ValidationError};
pub use event::{EventId, EventKind, TraceEvent};
pub use fsm::{FsmDefinition, FsmSpec, StateId, StateSpec, TransitionKey, TransitionRef, TransitionSpec};
pub use history::FieldHistory;
pub use incoherence::{Incoherence, IncoherenceId, InferredTransition, ResolutionStatus};
pub use inference::{
    FieldRule, FieldRuleTable, InferenceEngine, InferenceReport, InferredEvent, InferredField,
    StatisticsScope,
};
pub use observer::{CoherenceAlgorithm, CoherenceChecker, NaiveChecker, OptimizedChecker};
pub use pattern::{EventCatalog, EventPattern};
pub use scenario::{Certainty, Scenario, ScenarioId, ScenarioStatus};
pub use time::{TimeBounds, Timestamp};
pub use value::Value;
