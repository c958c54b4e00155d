use serde::{Deserialize, Serialize};

use crate::counters::TransitionCounters;
use crate::fsm::{TransitionKey, TransitionRef};

/// Which counters drive transition choice and path weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsScope {
    /// Counts over all scenarios of the FSM.
    Global,

    /// The scenario's own counts; global counts for transitions the scenario
    /// never took.
    #[default]
    LocalWithGlobalFallback,
}

impl StatisticsScope {
    /// Returns a short stable identifier suitable for logging/debugging.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::LocalWithGlobalFallback => "local_with_global_fallback",
        }
    }
}

/// Counters seen through a [`StatisticsScope`].
#[derive(Debug, Clone, Copy)]
pub struct TransitionStatistics<'a> {
    scope: StatisticsScope,
    global: &'a TransitionCounters,
    local: Option<&'a TransitionCounters>,
}

impl<'a> TransitionStatistics<'a> {
    /// Statistics over `global`, with `local` consulted first when the scope allows.
    #[must_use]
    pub const fn new(
        scope: StatisticsScope,
        global: &'a TransitionCounters,
        local: Option<&'a TransitionCounters>,
    ) -> Self {
        Self { scope, global, local }
    }

    /// The FSM-wide counters.
    #[must_use]
    pub const fn global(&self) -> &'a TransitionCounters {
        self.global
    }

    fn pick(&self, local: impl Fn(&TransitionCounters) -> u64) -> u64 {
        if let (StatisticsScope::LocalWithGlobalFallback, Some(counters)) = (self.scope, self.local) {
            let n = local(counters);
            if n > 0 {
                return n;
            }
        }
        local(self.global)
    }

    /// Observed count for one (transition, event name), `None` if never seen.
    #[must_use]
    pub fn score(&self, key: &TransitionKey) -> Option<u64> {
        Some(self.pick(|c| c.get(key))).filter(|n| *n > 0)
    }

    /// Observed count of a transition over all event names.
    #[must_use]
    pub fn edge_count(&self, transition: TransitionRef) -> u64 {
        self.pick(|c| c.edge_count(transition))
    }

    /// Path cost of a transition: `1 / max(count, 1)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn edge_weight(&self, transition: TransitionRef) -> f64 {
        1.0 / self.edge_count(transition).max(1) as f64
    }
}
