use crate::fsm::TransitionKey;
use crate::inference::TransitionStatistics;

/// Picks the candidate transition most likely to explain an incoherent event.
///
/// Candidates are considered in declaration order. The highest observed count
/// wins; on a tie the earlier candidate stays. If no candidate was ever
/// observed, the first one is returned. `None` only for an empty slice.
#[must_use]
pub fn best_transition<'c>(candidates: &'c [TransitionKey], stats: &TransitionStatistics<'_>) -> Option<&'c TransitionKey> {
    let mut ordered: Vec<&TransitionKey> = candidates.iter().collect();
    ordered.sort();

    let mut best: Option<(u64, &TransitionKey)> = None;
    for &candidate in &ordered {
        let Some(score) = stats.score(candidate) else {
            continue;
        };
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, c)| c).or_else(|| ordered.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::TransitionCounters;
    use crate::fsm::{FsmDefinition, StateSpec, TransitionRef, TransitionSpec};
    use crate::inference::StatisticsScope;

    fn keys() -> Vec<TransitionKey> {
        let fsm = FsmDefinition::builder("f")
            .state(StateSpec::new("A").transition(TransitionSpec::on(["x"], "C")))
            .state(StateSpec::new("B").transition(TransitionSpec::on(["x"], "C")))
            .state(StateSpec::new("C").transition(TransitionSpec::on(["x"], "A")))
            .build()
            .unwrap();
        ["C", "A", "B"]
            .iter()
            .map(|s| {
                TransitionKey::new(
                    TransitionRef {
                        source: fsm.state_id(s).unwrap(),
                        index: 0,
                    },
                    "x",
                )
            })
            .collect()
    }

    #[test]
    fn test_highest_count_wins() {
        let keys = keys();
        let mut global = TransitionCounters::new();
        global.increment(keys[1].clone());
        global.increment(keys[2].clone());
        global.increment(keys[2].clone());
        let stats = TransitionStatistics::new(StatisticsScope::Global, &global, None);
        assert_eq!(best_transition(&keys, &stats), Some(&keys[2]));
    }

    #[test]
    fn test_tie_goes_to_declaration_order() {
        let keys = keys();
        let mut global = TransitionCounters::new();
        global.increment(keys[0].clone());
        global.increment(keys[2].clone());
        let stats = TransitionStatistics::new(StatisticsScope::Global, &global, None);
        // B (keys[2]) is declared before C (keys[0]).
        assert_eq!(best_transition(&keys, &stats), Some(&keys[2]));
    }

    #[test]
    fn test_unobserved_picks_first_declared() {
        let keys = keys();
        let global = TransitionCounters::new();
        let stats = TransitionStatistics::new(StatisticsScope::Global, &global, None);
        assert_eq!(best_transition(&keys, &stats), Some(&keys[1]));
        assert_eq!(best_transition(&[], &stats), None);
    }
}
