//! Transition guards.
//!
//! Conditions are referenced by id from transitions and resolved through a
//! [`ConditionEvaluator`]. Besides live evaluation against an event, an
//! evaluator can run a condition "in reverse": it reports which field values
//! the condition pins down or rules out, which is what inferred events use to
//! fill in their content.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoherenceResult, ExecutionError};
use crate::event::TraceEvent;
use crate::scenario::ScenarioContext;
use crate::value::Value;

/// Identifier of a named condition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionId(String);

impl ConditionId {
    /// Creates a condition id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConditionId {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

/// Comparison operator of a condition leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Values are equal.
    Equal,
    /// Values differ.
    NotEqual,
}

impl CompareOp {
    const fn negate(self) -> Self {
        match self {
            Self::Equal => Self::NotEqual,
            Self::NotEqual => Self::Equal,
        }
    }
}

/// Right-hand side of a leaf comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Operand {
    /// A literal value.
    Constant(Value),
    /// A value previously stored in the scenario context by an action.
    Stored(String),
    /// Another field of the same event.
    Field(String),
}

/// A boolean condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Compares an event field against an operand.
    Compare {
        field: String,
        op: CompareOp,
        operand: Operand,
    },
    /// Every child holds.
    And(Vec<Condition>),
    /// At least one child holds.
    Or(Vec<Condition>),
    /// The child does not hold.
    Not(Box<Condition>),
}

impl Condition {
    /// `field == value`
    #[must_use]
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op: CompareOp::Equal,
            operand: Operand::Constant(value.into()),
        }
    }

    /// `field == stored[key]`
    #[must_use]
    pub fn field_equals_stored(field: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Compare {
            field: field.into(),
            op: CompareOp::Equal,
            operand: Operand::Stored(key.into()),
        }
    }

    /// Negates this condition.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    fn evaluate(&self, id: &ConditionId, event: &TraceEvent, ctx: &ScenarioContext) -> CoherenceResult<bool> {
        match self {
            Self::Compare { field, op, operand } => {
                let Some(lhs) = event.field(field) else {
                    return Ok(false);
                };
                let rhs = match operand {
                    Operand::Constant(v) => v,
                    Operand::Stored(key) => ctx.stored(key).ok_or_else(|| ExecutionError::MissingAttribute {
                        condition: id.to_string(),
                        attribute: key.clone(),
                    })?,
                    Operand::Field(other) => match event.field(other) {
                        Some(v) => v,
                        None => return Ok(false),
                    },
                };
                let equal = values_equal(lhs, rhs);
                Ok(match op {
                    CompareOp::Equal => equal,
                    CompareOp::NotEqual => !equal,
                })
            }
            Self::And(children) => {
                for child in children {
                    if !child.evaluate(id, event, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(children) => {
                for child in children {
                    if child.evaluate(id, event, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(inner) => Ok(!inner.evaluate(id, event, ctx)?),
        }
    }

    fn collect_constraints(
        &self,
        id: &ConditionId,
        ctx: &ScenarioContext,
        negated: bool,
        out: &mut Vec<FieldConstraint>,
    ) {
        match self {
            Self::Compare { field, op, operand } => {
                let value = match operand {
                    Operand::Constant(v) => v.clone(),
                    Operand::Stored(key) => {
                        if let Some(v) = ctx.stored(key) {
                            v.clone()
                        } else {
                            let err = ExecutionError::MissingAttribute {
                                condition: id.to_string(),
                                attribute: key.clone(),
                            };
                            warn!(condition = %id, error = %err, "cannot reverse-evaluate comparison");
                            return;
                        }
                    }
                    // Nothing is known about the other field of an event that never happened.
                    Operand::Field(_) => return,
                };
                let op = if negated { op.negate() } else { *op };
                out.push(match op {
                    CompareOp::Equal => FieldConstraint::Equals {
                        field: field.clone(),
                        value,
                    },
                    CompareOp::NotEqual => FieldConstraint::Excludes {
                        field: field.clone(),
                        value,
                    },
                });
            }
            Self::And(children) | Self::Or(children) => {
                // Under negation an `And` behaves as an `Or` and the reverse.
                if matches!(self, Self::Or(_)) == negated {
                    for child in children {
                        child.collect_constraints(id, ctx, negated, out);
                    }
                } else {
                    collect_alternatives(children, id, ctx, negated, out);
                }
            }
            Self::Not(inner) => inner.collect_constraints(id, ctx, !negated, out),
        }
    }
}

/// A field is pinned by a disjunction only when every branch pins it; the
/// branch values together form its candidate set.
fn collect_alternatives(
    children: &[Condition],
    id: &ConditionId,
    ctx: &ScenarioContext,
    negated: bool,
    out: &mut Vec<FieldConstraint>,
) {
    let mut merged: Option<BTreeMap<String, Vec<Value>>> = None;
    for child in children {
        let mut branch = Vec::new();
        child.collect_constraints(id, ctx, negated, &mut branch);

        let mut pinned: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for constraint in branch {
            match constraint {
                FieldConstraint::Equals { field, value } => pinned.insert(field, vec![value]),
                FieldConstraint::OneOf { field, values } => pinned.insert(field, values),
                FieldConstraint::Excludes { .. } => None,
            };
        }

        merged = Some(match merged {
            None => pinned,
            Some(mut acc) => {
                acc.retain(|field, _| pinned.contains_key(field));
                for (field, values) in &mut acc {
                    for value in pinned.remove(field).unwrap_or_default() {
                        if !values.iter().any(|v| values_equal(v, &value)) {
                            values.push(value);
                        }
                    }
                }
                acc
            }
        });
    }

    for (field, mut values) in merged.unwrap_or_default() {
        out.push(if values.len() == 1 {
            FieldConstraint::Equals {
                field,
                value: values.remove(0),
            }
        } else {
            FieldConstraint::OneOf { field, values }
        });
    }
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) if a.is_float() || b.is_float() => {
            a.as_float() == b.as_float()
        }
        _ => a == b,
    }
}

/// What a condition says about a field of the event it guards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldConstraint {
    /// The field must hold this value.
    Equals { field: String, value: Value },
    /// The field holds anything but this value.
    Excludes { field: String, value: Value },
    /// The field holds one of these values, the guard cannot tell which.
    OneOf { field: String, values: Vec<Value> },
}

impl FieldConstraint {
    /// The field the constraint is about.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Equals { field, .. } | Self::Excludes { field, .. } | Self::OneOf { field, .. } => field,
        }
    }
}

/// Resolves condition ids against events and scenario state.
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluates the condition for `event` in the scenario context `ctx`.
    fn evaluate(&self, id: &ConditionId, event: &TraceEvent, ctx: &ScenarioContext) -> CoherenceResult<bool>;

    /// Reports the field values the condition fixes or excludes.
    ///
    /// Leaves that cannot be resolved are logged and left out; the result is
    /// never an error just because one comparison lacked an operand.
    fn field_constraints(&self, id: &ConditionId, ctx: &ScenarioContext) -> CoherenceResult<Vec<FieldConstraint>>;
}

/// In-memory registry of named conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSet {
    conditions: BTreeMap<ConditionId, Condition>,
}

impl ConditionSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a condition.
    #[must_use]
    pub fn with(mut self, id: impl Into<ConditionId>, condition: Condition) -> Self {
        self.insert(id, condition);
        self
    }

    /// Registers (or replaces) a condition in place.
    pub fn insert(&mut self, id: impl Into<ConditionId>, condition: Condition) {
        self.conditions.insert(id.into(), condition);
    }

    /// Looks up a condition by id.
    #[must_use]
    pub fn get(&self, id: &ConditionId) -> Option<&Condition> {
        self.conditions.get(id)
    }

    fn lookup(&self, id: &ConditionId) -> CoherenceResult<&Condition> {
        self.conditions.get(id).ok_or_else(|| {
            ExecutionError::UnknownCondition {
                condition: id.to_string(),
            }
            .into()
        })
    }
}

impl ConditionEvaluator for ConditionSet {
    fn evaluate(&self, id: &ConditionId, event: &TraceEvent, ctx: &ScenarioContext) -> CoherenceResult<bool> {
        self.lookup(id)?.evaluate(id, event, ctx)
    }

    fn field_constraints(&self, id: &ConditionId, ctx: &ScenarioContext) -> CoherenceResult<Vec<FieldConstraint>> {
        let mut out = Vec::new();
        self.lookup(id)?.collect_constraints(id, ctx, false, &mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch(next_tid: i64) -> TraceEvent {
        TraceEvent::new(1, "sched_switch", 10).with_field("next_tid", next_tid)
    }

    #[test]
    fn test_compare_constant() {
        let set = ConditionSet::new().with("idle", Condition::field_equals("next_tid", 0));
        let ctx = ScenarioContext::default();
        assert!(set.evaluate(&"idle".into(), &switch(0), &ctx).unwrap());
        assert!(!set.evaluate(&"idle".into(), &switch(4), &ctx).unwrap());
    }

    #[test]
    fn test_missing_event_field_is_false() {
        let set = ConditionSet::new().with("idle", Condition::field_equals("next_tid", 0));
        let event = TraceEvent::new(1, "sched_switch", 10);
        assert!(!set.evaluate(&"idle".into(), &event, &ScenarioContext::default()).unwrap());
    }

    #[test]
    fn test_missing_stored_attribute_is_error() {
        let set = ConditionSet::new().with("same", Condition::field_equals_stored("next_tid", "tid"));
        let err = set
            .evaluate(&"same".into(), &switch(3), &ScenarioContext::default())
            .unwrap_err();
        assert!(err.is_execution());

        let mut ctx = ScenarioContext::default();
        ctx.store("tid", Value::Int(3));
        assert!(set.evaluate(&"same".into(), &switch(3), &ctx).unwrap());
    }

    #[test]
    fn test_unknown_condition() {
        let set = ConditionSet::new();
        assert!(set.evaluate(&"nope".into(), &switch(0), &ScenarioContext::default()).is_err());
    }

    #[test]
    fn test_int_float_comparison() {
        let set = ConditionSet::new().with("c", Condition::field_equals("next_tid", 2.0));
        assert!(set.evaluate(&"c".into(), &switch(2), &ScenarioContext::default()).unwrap());
    }

    #[test]
    fn test_reverse_equals_and_excludes() {
        let set = ConditionSet::new()
            .with("idle", Condition::field_equals("next_tid", 0))
            .with("busy", Condition::field_equals("next_tid", 0).negate());
        let ctx = ScenarioContext::default();

        assert_eq!(
            set.field_constraints(&"idle".into(), &ctx).unwrap(),
            vec![FieldConstraint::Equals {
                field: "next_tid".into(),
                value: Value::Int(0)
            }]
        );
        assert_eq!(
            set.field_constraints(&"busy".into(), &ctx).unwrap(),
            vec![FieldConstraint::Excludes {
                field: "next_tid".into(),
                value: Value::Int(0)
            }]
        );
    }

    #[test]
    fn test_double_negation_cancels() {
        let set = ConditionSet::new().with("c", Condition::field_equals("cpu", 1).negate().negate());
        let constraints = set.field_constraints(&"c".into(), &ScenarioContext::default()).unwrap();
        assert!(matches!(constraints[0], FieldConstraint::Equals { .. }));
    }

    #[test]
    fn test_reverse_skips_unresolvable_leaves() {
        let set = ConditionSet::new().with(
            "c",
            Condition::And(vec![
                Condition::field_equals_stored("next_tid", "tid"),
                Condition::field_equals("prev_state", 0),
            ]),
        );
        let constraints = set.field_constraints(&"c".into(), &ScenarioContext::default()).unwrap();
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].field(), "prev_state");
    }

    #[test]
    fn test_reverse_or_yields_candidate_set() {
        let set = ConditionSet::new().with(
            "c",
            Condition::Or(vec![
                Condition::field_equals("code", 1),
                Condition::And(vec![Condition::field_equals("code", 2), Condition::field_equals("cpu", 0)]),
            ]),
        );
        let constraints = set.field_constraints(&"c".into(), &ScenarioContext::default()).unwrap();
        assert_eq!(
            constraints,
            vec![FieldConstraint::OneOf {
                field: "code".into(),
                values: vec![Value::Int(1), Value::Int(2)]
            }]
        );
    }

    #[test]
    fn test_reverse_negated_and_is_disjunction() {
        // not(code != 1 and code != 2) is code == 1 or code == 2
        let set = ConditionSet::new().with(
            "c",
            Condition::And(vec![
                Condition::field_equals("code", 1).negate(),
                Condition::field_equals("code", 2).negate(),
            ])
            .negate(),
        );
        let constraints = set.field_constraints(&"c".into(), &ScenarioContext::default()).unwrap();
        assert!(matches!(&constraints[..], [FieldConstraint::OneOf { values, .. }] if values.len() == 2));
    }

    #[test]
    fn test_reverse_or_with_same_value_is_certain() {
        let set = ConditionSet::new().with(
            "c",
            Condition::Or(vec![Condition::field_equals("code", 2), Condition::field_equals("code", 2.0)]),
        );
        let constraints = set.field_constraints(&"c".into(), &ScenarioContext::default()).unwrap();
        assert!(matches!(&constraints[..], [FieldConstraint::Equals { value: Value::Int(2), .. }]));
    }
}
