use serde::{Deserialize, Serialize};

use super::transition::{StateId, Transition, TransitionSpec};

/// Name of the reserved state a scenario is forced into after an incoherence.
pub const ERROR_STATE_NAME: &str = "#error";

/// A node of the FSM graph: its outgoing transitions, in declaration order.
#[derive(Debug, Clone)]
pub struct State {
    pub(crate) id: StateId,
    pub(crate) name: String,
    pub(crate) transitions: Vec<Transition>,
}

impl State {
    /// Dense id of the state.
    #[must_use]
    pub const fn id(&self) -> StateId {
        self.id
    }

    /// Declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Outgoing transitions in declaration order.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

/// Declarative form of a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSpec {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) transitions: Vec<TransitionSpec>,
}

impl StateSpec {
    /// Creates a state with no transition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transitions: Vec::new(),
        }
    }

    /// Appends an outgoing transition.
    #[must_use]
    pub fn transition(mut self, transition: TransitionSpec) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
