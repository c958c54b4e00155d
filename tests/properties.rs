//! Properties that must hold for every FSM and every stream.

use proptest::prelude::*;

use tracecoherence::inference::{shortest_path, TransitionStatistics};
use tracecoherence::{
    AnalysisConfig, CancellationToken, CoherenceAlgorithm, CoherenceAnalyzer, Condition, ConditionSet,
    FieldKeyResolver, FsmDefinition, IncoherenceId, StateSpec, StatisticsScope, TraceEvent, TransitionCounters,
    TransitionKey, TransitionRef, TransitionSpec,
};

// ---------------------------------------------------------------------------
// Strategy generators
// ---------------------------------------------------------------------------

const NAMES: [&str; 6] = ["a", "b", "c", "syscall_entry_open", "syscall_entry_read", "x1"];
const PATTERNS: [&str; 8] = [
    "a",
    "b",
    "c",
    "syscall_entry_open",
    "syscall_entry_read",
    "x1",
    "syscall_entry_.*",
    "x.*",
];

#[derive(Debug, Clone)]
struct ArbTransition {
    pattern: usize,
    target: usize,
    guarded: bool,
}

/// Generate the transitions of `states` states.
fn arb_fsm_layout() -> impl Strategy<Value = Vec<Vec<ArbTransition>>> {
    (2usize..6).prop_flat_map(|states| {
        let transition = (0..PATTERNS.len(), 0..states, any::<bool>()).prop_map(|(pattern, target, guarded)| {
            ArbTransition {
                pattern,
                target,
                guarded,
            }
        });
        proptest::collection::vec(proptest::collection::vec(transition, 0..4), states)
    })
}

/// Generate a stream of (event name, tid, flag) triples.
fn arb_stream() -> impl Strategy<Value = Vec<(usize, i64, i64)>> {
    proptest::collection::vec((0..NAMES.len(), 1i64..3, 0i64..2), 1..40)
}

fn build_fsm(layout: &[Vec<ArbTransition>]) -> FsmDefinition {
    let mut spec = FsmDefinition::builder("random");
    for (i, transitions) in layout.iter().enumerate() {
        let mut state = StateSpec::new(format!("S{i}"));
        for t in transitions {
            let mut transition = TransitionSpec::on([PATTERNS[t.pattern]], format!("S{}", t.target));
            if t.guarded {
                transition = transition.when("flagged");
            }
            state = state.transition(transition);
        }
        spec = spec.state(state);
    }
    spec.build().unwrap()
}

type Observed = Vec<(IncoherenceId, u64, String, Vec<TransitionKey>)>;

fn incoherences_with(algorithm: CoherenceAlgorithm, fsm: FsmDefinition, stream: &[(usize, i64, i64)]) -> Observed {
    let config = AnalysisConfig {
        algorithm,
        ..AnalysisConfig::default()
    };
    let mut analyzer = CoherenceAnalyzer::builder()
        .config(config)
        .fsm(fsm, FieldKeyResolver::new(["tid"]))
        .conditions(ConditionSet::new().with("flagged", Condition::field_equals("flag", 1)))
        .build()
        .unwrap();

    let events = (1u64..).zip(stream).map(|(rank, &(name, tid, flag))| {
        TraceEvent::new(rank, NAMES[name], rank * 10)
            .with_field("tid", tid)
            .with_field("flag", flag)
    });
    analyzer.run(events, &CancellationToken::new()).unwrap();

    analyzer
        .incoherences("random")
        .unwrap()
        .iter()
        .map(|inc| {
            (
                inc.id(),
                inc.event().id.rank(),
                inc.state_name().to_string(),
                inc.candidates().to_vec(),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn naive_and_optimized_agree(layout in arb_fsm_layout(), stream in arb_stream()) {
        let naive = incoherences_with(CoherenceAlgorithm::Naive, build_fsm(&layout), &stream);
        let optimized = incoherences_with(CoherenceAlgorithm::Optimized, build_fsm(&layout), &stream);
        prop_assert_eq!(naive, optimized);
    }
}

// S0 -a-> S1 -b-> S3
// S0 -c-> S2 -d-> S3
fn diamond() -> FsmDefinition {
    FsmDefinition::builder("d")
        .state(
            StateSpec::new("S0")
                .transition(TransitionSpec::on(["a"], "S1"))
                .transition(TransitionSpec::on(["c"], "S2")),
        )
        .state(StateSpec::new("S1").transition(TransitionSpec::on(["b"], "S3")))
        .state(StateSpec::new("S2").transition(TransitionSpec::on(["d"], "S3")))
        .state(StateSpec::new("S3"))
        .build()
        .unwrap()
}

fn diamond_edges(fsm: &FsmDefinition) -> Vec<(TransitionRef, &'static str)> {
    let id = |name: &str| fsm.state_id(name).unwrap();
    vec![
        (TransitionRef { source: id("S0"), index: 0 }, "a"),
        (TransitionRef { source: id("S0"), index: 1 }, "c"),
        (TransitionRef { source: id("S1"), index: 0 }, "b"),
        (TransitionRef { source: id("S2"), index: 0 }, "d"),
    ]
}

fn path_cost(fsm: &FsmDefinition, counters: &TransitionCounters) -> f64 {
    let stats = TransitionStatistics::new(StatisticsScope::Global, counters, None);
    let from = fsm.state_id("S0").unwrap();
    let to = fsm.state_id("S3").unwrap();
    shortest_path(fsm, from, to, |e| stats.edge_weight(e)).unwrap().cost
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn path_cost_never_grows_with_counts(counts in proptest::collection::vec(0u64..6, 4), bumped in 0usize..4) {
        let fsm = diamond();
        let edges = diamond_edges(&fsm);

        let mut counters = TransitionCounters::new();
        for ((edge, name), &count) in edges.iter().zip(&counts) {
            for _ in 0..count {
                counters.increment(TransitionKey::new(*edge, *name));
            }
        }
        let before = path_cost(&fsm, &counters);

        let (edge, name) = edges[bumped];
        counters.increment(TransitionKey::new(edge, name));
        let after = path_cost(&fsm, &counters);

        prop_assert!(after <= before + 1e-12, "cost grew from {} to {}", before, after);
    }
}
