//! Actions run when a transition fires.
//!
//! Actions only touch the scenario context: they store event fields for later
//! conditions to compare against, or clear what was stored.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoherenceResult, ExecutionError};
use crate::event::TraceEvent;
use crate::scenario::ScenarioContext;

/// Identifier of a registered action.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Creates an action id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionId {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

/// Side effect applied to the scenario context when a transition is taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Action {
    /// Copy `field` of the triggering event into the context under `key`.
    StoreField { field: String, key: String },
    /// Forget everything stored in the context.
    ClearStoredFields,
}

/// In-memory registry of named actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionRegistry {
    actions: BTreeMap<ActionId, Action>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) an action.
    #[must_use]
    pub fn with(mut self, id: impl Into<ActionId>, action: Action) -> Self {
        self.actions.insert(id.into(), action);
        self
    }

    /// Runs one action.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::UnknownAction` when `id` is not registered.
    pub fn execute(&self, id: &ActionId, event: &TraceEvent, ctx: &mut ScenarioContext) -> CoherenceResult<()> {
        let action = self.actions.get(id).ok_or_else(|| ExecutionError::UnknownAction {
            action: id.to_string(),
        })?;

        match action {
            Action::StoreField { field, key } => match event.field(field) {
                Some(value) => ctx.store(key.clone(), value.clone()),
                None => debug!(action = %id, field = %field, event = %event.name, "field absent, nothing stored"),
            },
            Action::ClearStoredFields => ctx.clear(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_store_and_clear() {
        let registry = ActionRegistry::new()
            .with(
                "save_tid",
                Action::StoreField {
                    field: "tid".into(),
                    key: "cur".into(),
                },
            )
            .with("reset", Action::ClearStoredFields);
        let mut ctx = ScenarioContext::default();
        let event = TraceEvent::new(0, "syscall_entry_open", 1).with_field("tid", 42);

        registry.execute(&"save_tid".into(), &event, &mut ctx).unwrap();
        assert_eq!(ctx.stored("cur"), Some(&Value::Int(42)));

        registry.execute(&"reset".into(), &event, &mut ctx).unwrap();
        assert!(ctx.stored("cur").is_none());
    }

    #[test]
    fn test_unknown_action() {
        let registry = ActionRegistry::new();
        let err = registry
            .execute(&"missing".into(), &TraceEvent::new(0, "e", 1), &mut ScenarioContext::default())
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
