use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::action::ActionId;
use crate::condition::{ConditionEvaluator, ConditionId};
use crate::event::TraceEvent;
use crate::pattern::EventPattern;
use crate::scenario::ScenarioContext;

/// Dense index of a state inside its FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// Position in the state arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// An edge of the FSM graph: the `index`-th transition of state `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionRef {
    /// State the transition leaves.
    pub source: StateId,
    /// Position among the source's transitions.
    pub index: usize,
}

/// A transition taken (or takeable) by a specific event name.
///
/// Counters and candidate sets are keyed by this triple. The derived order is
/// declaration order: source state, then transition index, then event name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionKey {
    /// State the transition leaves.
    pub source: StateId,
    /// Position among the source's transitions.
    pub index: usize,
    /// Event name the transition was taken with.
    pub event: String,
}

impl TransitionKey {
    /// Creates a key for `transition` taken with `event`.
    #[must_use]
    pub fn new(transition: TransitionRef, event: impl Into<String>) -> Self {
        Self {
            source: transition.source,
            index: transition.index,
            event: event.into(),
        }
    }

    /// The transition without its event name.
    #[must_use]
    pub const fn transition(&self) -> TransitionRef {
        TransitionRef {
            source: self.source,
            index: self.index,
        }
    }
}

/// A compiled transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub(crate) patterns: Vec<EventPattern>,
    pub(crate) condition: Option<ConditionId>,
    pub(crate) actions: Vec<ActionId>,
    pub(crate) target: StateId,
}

impl Transition {
    /// Patterns of the events the transition accepts.
    #[must_use]
    pub fn patterns(&self) -> &[EventPattern] {
        &self.patterns
    }

    /// Guard, if any.
    #[must_use]
    pub const fn condition(&self) -> Option<&ConditionId> {
        self.condition.as_ref()
    }

    /// Actions run when the transition is taken.
    #[must_use]
    pub fn actions(&self) -> &[ActionId] {
        &self.actions
    }

    /// State the transition leads to.
    #[must_use]
    pub const fn target(&self) -> StateId {
        self.target
    }

    /// True if one of the event patterns accepts `name`.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    /// Name match plus guard. A guard that fails to evaluate counts as false.
    pub(crate) fn accepts(
        &self,
        event: &TraceEvent,
        ctx: &ScenarioContext,
        evaluator: &dyn ConditionEvaluator,
    ) -> bool {
        if !self.matches_name(&event.name) {
            return false;
        }
        let Some(condition) = &self.condition else {
            return true;
        };
        match evaluator.evaluate(condition, event, ctx) {
            Ok(result) => result,
            Err(err) => {
                warn!(condition = %condition, event = %event.name, error = %err, "condition evaluation failed");
                false
            }
        }
    }
}

/// Declarative form of a transition, consumed by the FSM builder.
///
/// # Examples
///
/// ```
/// use tracecoherence::TransitionSpec;
///
/// let t = TransitionSpec::on(["sched_switch"], "running")
///     .when("is_next")
///     .action("save_tid");
/// assert_eq!(t.target(), "running");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub(crate) events: Vec<String>,
    pub(crate) target: String,
    #[serde(default)]
    pub(crate) condition: Option<ConditionId>,
    #[serde(default)]
    pub(crate) actions: Vec<ActionId>,
}

impl TransitionSpec {
    /// A transition to `target` accepting any of `events`.
    pub fn on<I, S>(events: I, target: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
            target: target.into(),
            condition: None,
            actions: Vec::new(),
        }
    }

    /// Guards the transition with a named condition.
    #[must_use]
    pub fn when(mut self, condition: impl Into<ConditionId>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Runs a named action when the transition is taken.
    #[must_use]
    pub fn action(mut self, action: impl Into<ActionId>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Name of the target state.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }
}
