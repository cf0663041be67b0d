//! Introspection snapshots.

use serde::{Deserialize, Serialize};

/// Point-in-time view of the activation manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationStats {
    /// Configured cap.
    pub cap: usize,
    /// Size of the active set.
    pub active_count: usize,
    /// Number of capabilities with the essential tier.
    pub essential_count: usize,
    /// Number of registered capabilities.
    pub registered_count: usize,
    /// Number of context groups in the catalog.
    pub context_count: usize,
    /// Active context names, sorted.
    pub active_contexts: Vec<String>,
    /// Manual activations currently pinned.
    pub pinned_count: usize,
    /// How far the active set exceeds the cap. Non-zero only when essentials
    /// alone exceed it.
    pub over_cap_by: usize,
    /// Cap passes that could not reach the cap.
    pub budget_exceeded: u64,
    /// Total names evicted since construction.
    pub evictions_total: u64,
    /// Names evicted by the most recent pass that evicted anything.
    pub last_evicted: Vec<String>,
    /// Full recomputations of the active set.
    pub recomputations: u64,
    /// Cap passes, including the ones run by manual activation.
    pub cap_passes: u64,
}

impl ActivationStats {
    /// Whether the active set is currently over the cap.
    #[must_use]
    pub fn is_over_cap(&self) -> bool {
        self.over_cap_by > 0
    }

    /// Free slots under the cap.
    #[must_use]
    pub fn headroom(&self) -> usize {
        self.cap.saturating_sub(self.active_count)
    }
}

/// Counters kept by the [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Calls to `execute`.
    pub executions: u64,
    /// Executions that activated their capability first.
    pub auto_activations: u64,
    /// Executions answered with a stub result.
    pub stubs: u64,
    /// Executions that ended unsuccessfully, for any reason.
    pub failures: u64,
    /// Failures caused by a timeout.
    pub timeouts: u64,
    /// Failures caused by cancellation.
    pub cancellations: u64,
    /// Executions answered from the result cache.
    pub cache_hits: u64,
}
