use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// How to fill in one field of an inferred event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum FieldRule {
    /// Always this value.
    Constant { value: Value },
    /// Any value ever observed in one of `sources`.
    Observed { sources: Vec<String> },
}

/// Static content rules for well-known events, keyed by event name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRuleTable {
    #[serde(default)]
    events: BTreeMap<String, BTreeMap<String, FieldRule>>,
    /// Fields copied from the incoherent event onto every inferred one.
    #[serde(default)]
    inherited: Vec<String>,
}

const TID_FIELDS: [&str; 4] = ["tid", "prev_tid", "next_tid", "child_tid"];

impl FieldRuleTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for the Linux kernel events the kernel FSMs infer.
    #[must_use]
    pub fn linux_kernel() -> Self {
        let observed_tids = || FieldRule::Observed {
            sources: TID_FIELDS.iter().map(|s| (*s).to_string()).collect(),
        };
        let zero = || FieldRule::Constant { value: Value::Int(0) };

        Self::new()
            .with_rule("sched_switch", "prev_tid", observed_tids())
            .with_rule("sched_switch", "next_tid", observed_tids())
            .with_rule("sched_switch", "prev_state", zero())
            .with_rule("sched_switch", "prev_prio", zero())
            .with_rule("sched_switch", "next_prio", zero())
            .with_rule("irq_handler_entry", "irq", zero())
            .with_rule("irq_handler_exit", "irq", zero())
            .with_inherited("cpu")
    }

    /// Adds a rule for `field` of `event`.
    #[must_use]
    pub fn with_rule(mut self, event: impl Into<String>, field: impl Into<String>, rule: FieldRule) -> Self {
        self.events
            .entry(event.into())
            .or_default()
            .insert(field.into(), rule);
        self
    }

    /// Copies `field` from the incoherent event onto inferred events.
    #[must_use]
    pub fn with_inherited(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.inherited.contains(&field) {
            self.inherited.push(field);
        }
        self
    }

    /// Rules for one event name.
    pub fn rules_for(&self, event: &str) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.events
            .get(event)
            .into_iter()
            .flat_map(|fields| fields.iter().map(|(f, r)| (f.as_str(), r)))
    }

    /// Fields copied from the incoherent event.
    #[must_use]
    pub fn inherited(&self) -> &[String] {
        &self.inherited
    }
}
