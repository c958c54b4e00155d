//! Transition frequency statistics.
//!
//! Each coordinator owns one global `TransitionCounters`; each scenario owns a
//! local one. The coordinator sequences every write, so both stay consistent
//! with event arrival order. Inference only reads them.

use std::collections::BTreeMap;

use crate::fsm::{TransitionKey, TransitionRef};

/// Observed-occurrence counts keyed by (source, transition, event name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionCounters {
    counts: BTreeMap<TransitionKey, u64>,
    total: u64,
}

impl TransitionCounters {
    /// Creates empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more occurrence of `key`.
    pub fn increment(&mut self, key: TransitionKey) {
        *self.counts.entry(key).or_insert(0) += 1;
        self.total += 1;
    }

    /// Count for one exact key (0 if never seen).
    #[must_use]
    pub fn get(&self, key: &TransitionKey) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Count of a transition across every event name it was taken with.
    #[must_use]
    pub fn edge_count(&self, transition: TransitionRef) -> u64 {
        self.edge_entries(transition).map(|(_, c)| c).sum()
    }

    /// Per-event-name counts of one transition, in name order.
    pub fn edge_entries(&self, transition: TransitionRef) -> impl Iterator<Item = (&str, u64)> {
        let lower = TransitionKey::new(transition, String::new());
        self.counts
            .range(lower..)
            .take_while(move |(k, _)| k.source == transition.source && k.index == transition.index)
            .map(|(k, c)| (k.event.as_str(), *c))
    }

    /// Total number of increments.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Whether nothing was counted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Every key with its count, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&TransitionKey, u64)> {
        self.counts.iter().map(|(k, c)| (k, *c))
    }
}
