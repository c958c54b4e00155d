use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::condition::{values_equal, FieldConstraint};
use crate::correlation::CorrelationKey;
use crate::error::{CoherenceResult, ExecutionError};
use crate::incoherence::{Incoherence, IncoherenceId};
use crate::time::{TimeBounds, Timestamp};
use crate::value::Value;

use super::rules::{FieldRule, FieldRuleTable};
use super::InferenceContext;

/// Content of one field of an inferred event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InferredField {
    /// Exactly one value is possible.
    Single { value: Value },
    /// Several values are plausible; `choice` indexes the one reported.
    Ambiguous { candidates: Vec<Value>, choice: usize },
}

impl InferredField {
    fn from_candidates(mut candidates: Vec<Value>) -> Option<Self> {
        match candidates.len() {
            0 => None,
            1 => candidates.pop().map(|value| Self::Single { value }),
            _ => Some(Self::Ambiguous { candidates, choice: 0 }),
        }
    }

    /// The value currently reported for this field.
    #[must_use]
    pub fn value(&self) -> &Value {
        match self {
            Self::Single { value } => value,
            Self::Ambiguous { candidates, choice } => &candidates[*choice],
        }
    }

    /// Every plausible value.
    #[must_use]
    pub fn candidates(&self) -> &[Value] {
        match self {
            Self::Single { value } => std::slice::from_ref(value),
            Self::Ambiguous { candidates, .. } => candidates,
        }
    }

    /// Whether several values are plausible.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

/// A synthetic event reconstructed to explain an incoherence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredEvent {
    fsm_id: String,
    key: CorrelationKey,
    incoherence: IncoherenceId,
    name: String,
    bounds: TimeBounds,
    local_rank: u64,
    timestamp: Timestamp,
    fields: BTreeMap<String, InferredField>,
}

impl InferredEvent {
    /// FSM that inferred the event.
    #[must_use]
    pub fn fsm_id(&self) -> &str {
        &self.fsm_id
    }

    /// Correlation key of the scenario.
    #[must_use]
    pub const fn key(&self) -> &CorrelationKey {
        &self.key
    }

    /// The incoherence this event helps explain.
    #[must_use]
    pub const fn incoherence(&self) -> IncoherenceId {
        self.incoherence
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Window between the last coherent event and the incoherent one.
    #[must_use]
    pub const fn bounds(&self) -> TimeBounds {
        self.bounds
    }

    /// Position among the events inferred for the same incoherence, from 1.
    #[must_use]
    pub const fn local_rank(&self) -> u64 {
        self.local_rank
    }

    /// Interpolated timestamp inside [`bounds`](Self::bounds).
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Looks up a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&InferredField> {
        self.fields.get(name)
    }

    /// All fields by name.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, InferredField> {
        &self.fields
    }

    /// Field values as currently chosen.
    #[must_use]
    pub fn content(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .map(|(name, f)| (name.clone(), f.value().clone()))
            .collect()
    }

    /// True if at least one field is ambiguous.
    #[must_use]
    pub fn is_multi(&self) -> bool {
        self.fields.values().any(InferredField::is_ambiguous)
    }

    /// Selects which candidate an ambiguous field reports.
    ///
    /// # Errors
    ///
    /// `UnknownInferredField` if the event has no such field, `InvalidChoice`
    /// if `value` is not one of its candidates.
    pub fn choose(&mut self, field: &str, value: impl Into<Value>) -> CoherenceResult<()> {
        let value = value.into();
        let entry = self
            .fields
            .get_mut(field)
            .ok_or_else(|| ExecutionError::UnknownInferredField {
                field: field.to_string(),
            })?;
        let invalid = || ExecutionError::InvalidChoice {
            field: field.to_string(),
            value: value.to_string(),
        };
        match entry {
            InferredField::Single { value: current } => {
                if *current != value {
                    return Err(invalid().into());
                }
            }
            InferredField::Ambiguous { candidates, choice } => {
                let index = candidates.iter().position(|c| *c == value).ok_or_else(invalid)?;
                *choice = index;
            }
        }
        Ok(())
    }

    pub(crate) fn chronological_cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.timestamp, self.bounds.end, &self.fsm_id, &self.key, self.local_rank).cmp(&(
            other.timestamp,
            other.bounds.end,
            &other.fsm_id,
            &other.key,
            other.local_rank,
        ))
    }
}

impl fmt::Display for InferredEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}~{}] {}", self.timestamp, self.bounds, self.name)?;
        if !self.fields.is_empty() {
            let parts: Vec<String> = self
                .fields
                .iter()
                .map(|(k, v)| match v {
                    InferredField::Single { value } => format!("{k}={value}"),
                    InferredField::Ambiguous { candidates, .. } => format!("{k}={}?({})", v.value(), candidates.len()),
                })
                .collect();
            write!(f, " {{ {} }}", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Builds the synthetic events of a resolved incoherence: one per inferred
/// transition except the last, which is the real incoherent event.
pub(crate) fn synthesize(inc: &Incoherence, ctx: &InferenceContext<'_>, rules: &FieldRuleTable) -> Vec<InferredEvent> {
    let steps = inc.inferred();
    if steps.len() < 2 {
        return Vec::new();
    }
    let missing = &steps[..steps.len() - 1];

    let end = inc.timestamp();
    let start = inc.previous_event().map_or(ctx.trace_start, |e| e.timestamp).min(end);
    let Ok(bounds) = TimeBounds::new(start, end) else {
        return Vec::new();
    };
    let count = missing.len() as u64;
    let scenario_ctx = ctx.scenario_context(inc.scenario());

    let mut events = Vec::with_capacity(missing.len());
    for (rank, step) in (1..).zip(missing) {
        let mut candidates: BTreeMap<String, Vec<Value>> = BTreeMap::new();

        for field in rules.inherited() {
            if let Some(v) = inc.event().field(field) {
                candidates.insert(field.clone(), vec![v.clone()]);
            }
        }
        for (field, rule) in rules.rules_for(&step.event) {
            let values = match rule {
                FieldRule::Constant { value } => vec![value.clone()],
                FieldRule::Observed { sources } => ctx.history.union(sources),
            };
            if !values.is_empty() {
                candidates.insert(field.to_string(), values);
            }
        }

        let condition = ctx.fsm.transition(step.transition).and_then(|t| t.condition());
        if let Some(condition) = condition {
            match ctx.evaluator.field_constraints(condition, &scenario_ctx) {
                Ok(constraints) => {
                    for constraint in constraints {
                        apply_constraint(&mut candidates, constraint, ctx);
                    }
                }
                Err(err) => {
                    warn!(fsm = %inc.fsm_id(), condition = %condition, error = %err, "guard ignored for inferred content");
                }
            }
        }

        let fields = candidates
            .into_iter()
            .filter_map(|(name, values)| InferredField::from_candidates(values).map(|f| (name, f)))
            .collect();

        events.push(InferredEvent {
            fsm_id: inc.fsm_id().to_string(),
            key: inc.key().clone(),
            incoherence: inc.id(),
            name: step.event.clone(),
            bounds,
            local_rank: rank,
            timestamp: bounds.interpolate(rank, count),
            fields,
        });
    }
    events
}

fn apply_constraint(candidates: &mut BTreeMap<String, Vec<Value>>, constraint: FieldConstraint, ctx: &InferenceContext<'_>) {
    match constraint {
        FieldConstraint::Equals { field, value } => {
            candidates.insert(field, vec![value]);
        }
        FieldConstraint::OneOf { field, values } => {
            candidates.insert(field, values);
        }
        FieldConstraint::Excludes { field, value } => {
            let base = candidates
                .remove(&field)
                .unwrap_or_else(|| ctx.history.values(&field).to_vec());
            let remaining: Vec<Value> = base.into_iter().filter(|v| !values_equal(v, &value)).collect();
            candidates.insert(field, remaining);
        }
    }
}
