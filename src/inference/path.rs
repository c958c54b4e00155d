use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::counters::TransitionCounters;
use crate::fsm::{FsmDefinition, StateId, TransitionRef};

/// A sequence of transitions in causal order with its total cost.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedPath {
    /// Transitions from source to destination.
    pub edges: Vec<TransitionRef>,
    /// Sum of edge weights.
    pub cost: f64,
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    cost: f64,
    state: StateId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed: BinaryHeap is a max-heap, the cheapest entry must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.state.cmp(&self.state))
    }
}

/// Cheapest path of transitions leading from `from` to `to`.
///
/// The search runs backwards from `to` over incoming transitions, so one pass
/// settles exactly the states that can reach `to`. Returns `None` when `from`
/// cannot reach `to`; an empty path when they are the same state.
pub fn shortest_path<F>(fsm: &FsmDefinition, from: StateId, to: StateId, weight: F) -> Option<WeightedPath>
where
    F: Fn(TransitionRef) -> f64,
{
    let mut dist: HashMap<StateId, f64> = HashMap::new();
    // For each settled state, the first transition of its cheapest path to `to`.
    let mut next: HashMap<StateId, (TransitionRef, StateId)> = HashMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(to, 0.0);
    heap.push(Frontier { cost: 0.0, state: to });

    while let Some(Frontier { cost, state }) = heap.pop() {
        if state == from {
            let mut edges = Vec::new();
            let mut cur = from;
            while cur != to {
                let (edge, target) = next.get(&cur).copied()?;
                edges.push(edge);
                cur = target;
            }
            return Some(WeightedPath { edges, cost });
        }
        if dist.get(&state).is_some_and(|best| cost > *best) {
            continue;
        }
        for &edge in fsm.incoming(state) {
            let candidate = cost + weight(edge);
            let improves = dist.get(&edge.source).map_or(true, |best| candidate < *best);
            if improves {
                dist.insert(edge.source, candidate);
                next.insert(edge.source, (edge, state));
                heap.push(Frontier {
                    cost: candidate,
                    state: edge.source,
                });
            }
        }
    }
    None
}

/// Event name an inferred transition is reported with.
///
/// Prefers the name the transition was most often taken with, then its first
/// literal pattern, then the first catalog name a wildcard expands to.
#[must_use]
pub fn representative_event(fsm: &FsmDefinition, edge: TransitionRef, counters: &TransitionCounters) -> String {
    let mut best: Option<(&str, u64)> = None;
    for (name, count) in counters.edge_entries(edge) {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((name, count));
        }
    }
    if let Some((name, _)) = best {
        return name.to_string();
    }

    let Some(transition) = fsm.transition(edge) else {
        return String::new();
    };
    if let Some(literal) = transition.patterns().iter().find(|p| !p.is_wildcard()) {
        return literal.as_str().to_string();
    }
    fsm.event_names(edge)
        .into_iter()
        .next()
        .or_else(|| transition.patterns().first().map(|p| p.as_str().to_string()))
        .unwrap_or_default()
}
