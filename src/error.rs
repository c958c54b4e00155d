//! Error types for tracecoherence.
//!
//! All errors are strongly typed using thiserror. Structural problems with an
//! FSM definition or a configuration are `ValidationError`s and abort the
//! analysis; everything that can go wrong while a stream is being processed is
//! an `ExecutionError`, which callers log and absorb per event.

use thiserror::Error;

use crate::time::Timestamp;

/// Structural errors raised while building FSM definitions, analyzers or configs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The FSM id is blank.
    #[error("FSM id cannot be empty")]
    EmptyFsmId,

    /// Two FSMs share an id.
    #[error("FSM '{fsm_id}' is defined more than once")]
    DuplicateFsm {
        fsm_id: String,
    },

    /// The FSM has no state.
    #[error("FSM '{fsm_id}' declares no states")]
    NoStates {
        fsm_id: String,
    },

    /// A state name is used twice, or is the reserved error state name.
    #[error("FSM '{fsm_id}' declares state '{state}' more than once")]
    DuplicateState {
        fsm_id: String,
        state: String,
    },

    /// The initial state is not declared.
    #[error("FSM '{fsm_id}': initial state '{state}' is not defined")]
    UndefinedInitialState {
        fsm_id: String,
        state: String,
    },

    /// The final or abandon state is not declared.
    #[error("FSM '{fsm_id}': {role} state '{state}' is not defined")]
    UndefinedSentinelState {
        fsm_id: String,
        role: &'static str,
        state: String,
    },

    /// A transition targets an undeclared state.
    #[error("FSM '{fsm_id}': transition from '{state}' targets undefined state '{target}'")]
    DanglingTarget {
        fsm_id: String,
        state: String,
        target: String,
    },

    /// A transition lists no event.
    #[error("FSM '{fsm_id}': transition from '{state}' accepts no event")]
    EmptyEventSet {
        fsm_id: String,
        state: String,
    },

    /// An event pattern does not compile.
    #[error("Invalid event pattern '{pattern}': {reason}")]
    InvalidEventPattern {
        pattern: String,
        reason: String,
    },

    /// A time window ends before it starts.
    #[error("Invalid time bounds: start ({start}) must not be after end ({end})")]
    InvalidTimeBounds {
        start: Timestamp,
        end: Timestamp,
    },

    /// An initial FSM id names no registered FSM.
    #[error("Initial FSM '{fsm_id}' is not registered")]
    UnknownInitialFsm {
        fsm_id: String,
    },

    /// The configuration is malformed or out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors that occur while processing events or computing inferences.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No FSM has this id.
    #[error("FSM not found: {fsm_id}")]
    UnknownFsm {
        fsm_id: String,
    },

    /// No state has this name or id.
    #[error("State '{state}' not found in FSM '{fsm_id}'")]
    StateNotFound {
        fsm_id: String,
        state: String,
    },

    /// No condition has this id.
    #[error("Condition not found: {condition}")]
    UnknownCondition {
        condition: String,
    },

    /// A condition reads a stored attribute that was never set.
    #[error("Condition '{condition}' needs attribute '{attribute}' which is not set")]
    MissingAttribute {
        condition: String,
        attribute: String,
    },

    /// No action has this id.
    #[error("Action not found: {action}")]
    UnknownAction {
        action: String,
    },

    /// An event is older than the one before it.
    #[error("Event at {current} arrived after an event at {previous}")]
    EventOutOfOrder {
        previous: Timestamp,
        current: Timestamp,
    },

    /// The algorithm was changed after events were processed.
    #[error("Coherence algorithm cannot change once events have been processed")]
    AlgorithmLocked,

    /// The inferred event has no such field.
    #[error("Inferred event has no field '{field}'")]
    UnknownInferredField {
        field: String,
    },

    /// The value is not one of the field's candidates.
    #[error("Value {value} is not a candidate for field '{field}'")]
    InvalidChoice {
        field: String,
        value: String,
    },

    /// An inference worker thread failed.
    #[error("Inference worker failed: {message}")]
    InferenceWorker {
        message: String,
    },
}

/// Top-level error type for tracecoherence.
#[derive(Debug, Error)]
pub enum CoherenceError {
    /// Structural error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Error raised while processing.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Invariant violation inside the crate.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl CoherenceError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if stream processing may continue after this error.
    ///
    /// Structural errors stop the whole analysis; per-event failures do not.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => !matches!(e, ExecutionError::InferenceWorker { .. }),
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for tracecoherence operations.
pub type CoherenceResult<T> = Result<T, CoherenceError>;
