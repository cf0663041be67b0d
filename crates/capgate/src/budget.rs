//! Cap enforcement by priority eviction.
//!
//! [`enforce_cap`] trims a candidate set down to the cap. Candidates are
//! evicted lowest tier first and, within a tier, in the order the manager
//! first observed them. Essential candidates are never evicted; when they
//! alone exceed the cap the outcome reports the overflow instead.

use std::collections::HashSet;

use crate::tier::Tier;

/// Result of one cap pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapOutcome {
    /// Names removed from the candidate set, in eviction order.
    pub evicted: Vec<String>,
    /// How far the remaining set still exceeds the cap. Non-zero only when
    /// non-evictable candidates alone exceed it.
    pub over_cap_by: usize,
}

impl CapOutcome {
    /// Whether the cap could not be met.
    #[must_use]
    pub fn budget_exceeded(&self) -> bool {
        self.over_cap_by > 0
    }
}

/// Trim `candidate` to at most `cap` names.
///
/// `tier_of` and `seq_of` supply each name's tier and first-seen sequence
/// number. Ties on both fall back to the name so the result never depends
/// on hash order.
///
/// # Example
///
/// ```
/// use std::collections::HashSet;
/// use capgate::{Tier, budget::enforce_cap};
///
/// let mut candidate: HashSet<String> = ["a", "b", "c"].map(String::from).into();
/// let outcome = enforce_cap(
///     &mut candidate,
///     2,
///     |name| if name == "a" { Tier::High } else { Tier::Low },
///     |name| if name == "b" { 0 } else { 1 },
/// );
/// assert_eq!(outcome.evicted, vec!["b".to_string()]);
/// assert_eq!(candidate.len(), 2);
/// ```
pub fn enforce_cap<T, S>(
    candidate: &mut HashSet<String>,
    cap: usize,
    tier_of: T,
    seq_of: S,
) -> CapOutcome
where
    T: Fn(&str) -> Tier,
    S: Fn(&str) -> u64,
{
    let excess = candidate.len().saturating_sub(cap);
    if excess == 0 {
        return CapOutcome::default();
    }

    let mut evictable: Vec<(Tier, u64, &String)> = candidate
        .iter()
        .filter_map(|name| {
            let tier = tier_of(name);
            tier.is_evictable().then(|| (tier, seq_of(name), name))
        })
        .collect();
    evictable.sort_unstable();

    let evicted: Vec<String> = evictable
        .into_iter()
        .take(excess)
        .map(|(_, _, name)| name.clone())
        .collect();

    for name in &evicted {
        candidate.remove(name);
    }

    CapOutcome {
        evicted,
        over_cap_by: candidate.len().saturating_sub(cap),
    }
}
