//! Values observed per field name over the whole stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::TraceEvent;
use crate::value::Value;

/// Distinct values seen for each field, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldHistory {
    values: BTreeMap<String, Vec<Value>>,
}

impl FieldHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every payload field of `event`.
    pub fn record(&mut self, event: &TraceEvent) {
        for (name, value) in &event.fields {
            let seen = self.values.entry(name.clone()).or_default();
            if !seen.contains(value) {
                seen.push(value.clone());
            }
        }
    }

    /// Values seen for `field`, in first-seen order.
    #[must_use]
    pub fn values(&self, field: &str) -> &[Value] {
        self.values.get(field).map_or(&[], Vec::as_slice)
    }

    /// Union of the values of several fields, first-seen order per field.
    #[must_use]
    pub fn union<S: AsRef<str>>(&self, fields: &[S]) -> Vec<Value> {
        let mut out: Vec<Value> = Vec::new();
        for field in fields {
            for v in self.values(field.as_ref()) {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_order_without_duplicates() {
        let mut history = FieldHistory::new();
        for (i, tid) in [5, 3, 5, 8].into_iter().enumerate() {
            history.record(&TraceEvent::new(i as u64, "e", i as u64).with_field("tid", tid));
        }
        assert_eq!(history.values("tid"), &[Value::Int(5), Value::Int(3), Value::Int(8)]);
        assert!(history.values("cpu").is_empty());
    }

    #[test]
    fn test_union() {
        let mut history = FieldHistory::new();
        history.record(&TraceEvent::new(0, "sched_switch", 1).with_field("prev_tid", 1).with_field("next_tid", 2));
        history.record(&TraceEvent::new(1, "sched_switch", 2).with_field("prev_tid", 2).with_field("next_tid", 3));
        assert_eq!(
            history.union(&["prev_tid", "next_tid"]),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }
}
