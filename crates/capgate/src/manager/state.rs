//! Lock-protected manager state and the recomputation algorithm.
//!
//! Every method here runs inside the manager's write lock and appends the
//! events it produces to `events`; the caller publishes them after the lock
//! is released.

use std::collections::{BTreeSet, HashMap, HashSet};

use capgate_events::{ActivationCause, ActivationEvent, EventMetadata};
use tracing::{debug, info, warn};

use crate::budget::{CapOutcome, enforce_cap};
use crate::catalog::{ContextCatalog, ContextGroup};
use crate::descriptor::CapabilityDescriptor;
use crate::priority::PriorityTable;
use crate::registry::CapabilityRegistry;
use crate::stats::ActivationStats;
use crate::tier::Tier;

pub(crate) const EVENT_SOURCE: &str = "capgate.manager";

fn metadata() -> EventMetadata {
    EventMetadata::new(EVENT_SOURCE)
}

/// First-seen sequence numbers used as the eviction tie-break.
///
/// Entries are never reassigned or dropped, so the map grows with the
/// number of distinct names ever seen, deregistered ones included.
#[derive(Debug, Default)]
pub(crate) struct FirstSeen {
    next: u64,
    seq: HashMap<String, u64>,
}

impl FirstSeen {
    /// Record `name` if it has not been seen yet.
    pub(crate) fn observe(&mut self, name: &str) {
        if !self.seq.contains_key(name) {
            self.seq.insert(name.to_owned(), self.next);
            self.next = self.next.saturating_add(1);
        }
    }

    /// Sequence of `name`; names never observed sort last.
    pub(crate) fn get(&self, name: &str) -> u64 {
        self.seq.get(name).copied().unwrap_or(u64::MAX)
    }
}

#[derive(Debug, Default)]
struct Counters {
    recomputations: u64,
    cap_passes: u64,
    evictions_total: u64,
    budget_exceeded: u64,
    over_cap_by: usize,
    last_evicted: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct ManagerState {
    cap: usize,
    pub(crate) registry: CapabilityRegistry,
    pub(crate) catalog: ContextCatalog,
    pub(crate) priorities: PriorityTable,
    pub(crate) active_contexts: BTreeSet<String>,
    pub(crate) active: HashSet<String>,
    pinned: HashSet<String>,
    first_seen: FirstSeen,
    counters: Counters,
}

impl ManagerState {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            registry: CapabilityRegistry::new(),
            catalog: ContextCatalog::new(),
            priorities: PriorityTable::new(),
            active_contexts: BTreeSet::new(),
            active: HashSet::new(),
            pinned: HashSet::new(),
            first_seen: FirstSeen::default(),
            counters: Counters::default(),
        }
    }

    pub(crate) fn cap(&self) -> usize {
        self.cap
    }

    fn over_cap(&self) -> bool {
        self.active.len() > self.cap
    }

    // -- Registry ----------------------------------------------------------

    pub(crate) fn register(
        &mut self,
        descriptor: CapabilityDescriptor,
        events: &mut Vec<ActivationEvent>,
    ) {
        let name = descriptor.name.clone();
        self.first_seen.observe(&name);

        let was_essential = self.priorities.is_essential(&name);
        if let Some(tier) = descriptor.tier {
            self.priorities.set(name.clone(), tier);
        }
        let tier = self.priorities.tier(&name);

        let replaced = self.registry.insert(descriptor).is_some();
        if replaced {
            info!(capability = %name, %tier, "Capability re-registered");
        } else {
            debug!(capability = %name, %tier, "Capability registered");
        }
        events.push(ActivationEvent::CapabilityRegistered {
            metadata: metadata(),
            capability: name.clone(),
            tier: tier.as_str().to_owned(),
            replaced,
        });

        if was_essential != self.priorities.is_essential(&name) || self.over_cap() {
            self.recompute(events);
        }
    }

    pub(crate) fn deregister(&mut self, name: &str, events: &mut Vec<ActivationEvent>) -> bool {
        if self.registry.remove(name).is_none() {
            debug!(capability = %name, "Deregister of unknown capability ignored");
            return false;
        }
        // Only the essential tier goes with the descriptor; other tiers
        // still rank the name as a context member.
        if self.priorities.is_essential(name) {
            self.priorities.remove(name);
        }
        self.pinned.remove(name);
        let was_active = self.active.contains(name);

        debug!(capability = %name, was_active, "Capability deregistered");
        events.push(ActivationEvent::CapabilityDeregistered {
            metadata: metadata(),
            capability: name.to_owned(),
        });

        // Refill the freed slot, keeping `name` out until the next full
        // recompute.
        let mut candidate = self.candidate();
        candidate.remove(name);
        self.counters.recomputations = self.counters.recomputations.saturating_add(1);
        self.settle(candidate, ActivationCause::Context, events);
        true
    }

    // -- Catalog -----------------------------------------------------------

    pub(crate) fn add_context_group(
        &mut self,
        group: ContextGroup,
        events: &mut Vec<ActivationEvent>,
    ) {
        for member in group.members() {
            self.first_seen.observe(member);
        }
        let name = group.name.clone();
        debug!(context = %name, members = group.len(), "Context group set");
        self.catalog.insert_group(group);

        if self.active_contexts.contains(&name) {
            self.recompute(events);
        }
    }

    pub(crate) fn remove_context_group(
        &mut self,
        name: &str,
        events: &mut Vec<ActivationEvent>,
    ) -> bool {
        if self.catalog.remove_group(name).is_none() {
            return false;
        }
        debug!(context = %name, "Context group removed");
        if self.active_contexts.remove(name) {
            self.push_contexts_changed(false, events);
            self.recompute(events);
        }
        true
    }

    pub(crate) fn set_active_contexts(
        &mut self,
        contexts: BTreeSet<String>,
        scoped: bool,
        events: &mut Vec<ActivationEvent>,
    ) {
        if contexts != self.active_contexts {
            self.active_contexts = contexts;
            self.push_contexts_changed(scoped, events);
        }
        self.recompute(events);
    }

    fn push_contexts_changed(&self, scoped: bool, events: &mut Vec<ActivationEvent>) {
        debug!(contexts = ?self.active_contexts, scoped, "Active contexts changed");
        events.push(ActivationEvent::ContextsChanged {
            metadata: metadata(),
            contexts: self.active_contexts.iter().cloned().collect(),
            scoped,
        });
    }

    // -- Priorities --------------------------------------------------------

    pub(crate) fn set_priority(&mut self, name: &str, tier: Tier, events: &mut Vec<ActivationEvent>) {
        self.first_seen.observe(name);
        let previous = self.priorities.set(name, tier);
        debug!(capability = %name, %tier, ?previous, "Priority set");

        let was_essential = previous == Some(Tier::Essential);
        if was_essential != (tier == Tier::Essential) || self.over_cap() {
            self.recompute(events);
        }
    }

    // -- Activation --------------------------------------------------------

    /// Register `name` without a handler if it is unknown.
    fn ensure_registered(&mut self, name: &str, events: &mut Vec<ActivationEvent>) {
        self.first_seen.observe(name);
        if self.registry.contains(name) {
            return;
        }
        self.registry.insert(CapabilityDescriptor::new(name));
        let tier = self.priorities.tier(name);
        debug!(capability = %name, %tier, "Capability auto-registered on activation");
        events.push(ActivationEvent::CapabilityRegistered {
            metadata: metadata(),
            capability: name.to_owned(),
            tier: tier.as_str().to_owned(),
            replaced: false,
        });
    }

    /// Pin and admit `names`, then run a single cap pass over the current
    /// active set plus the new names. Returns how many of `names` survived.
    pub(crate) fn activate_many(
        &mut self,
        names: &[String],
        cause: ActivationCause,
        events: &mut Vec<ActivationEvent>,
    ) -> usize {
        let mut requested = BTreeSet::new();
        for name in names {
            self.ensure_registered(name, events);
            self.pinned.insert(name.clone());
            requested.insert(name.as_str());
        }

        let mut candidate = self.active.clone();
        candidate.extend(requested.iter().map(|n| (*n).to_owned()));
        self.settle(candidate, cause, events);

        requested.iter().filter(|n| self.active.contains(**n)).count()
    }

    pub(crate) fn deactivate(&mut self, name: &str, events: &mut Vec<ActivationEvent>) -> bool {
        if self.priorities.is_essential(name) {
            debug!(capability = %name, "Refusing to deactivate essential capability");
            return false;
        }
        self.pinned.remove(name);
        if !self.active.remove(name) {
            return false;
        }
        debug!(capability = %name, "Capability deactivated");
        events.push(ActivationEvent::Deactivated {
            metadata: metadata(),
            capability: name.to_owned(),
        });
        true
    }

    // -- Recomputation -----------------------------------------------------

    /// Rebuild the active set from essentials, active contexts and pins.
    pub(crate) fn recompute(&mut self, events: &mut Vec<ActivationEvent>) {
        let candidate = self.candidate();
        self.counters.recomputations = self.counters.recomputations.saturating_add(1);
        self.settle(candidate, ActivationCause::Context, events);
    }

    /// Essentials, members of active contexts and pinned names.
    fn candidate(&self) -> HashSet<String> {
        let mut candidate: HashSet<String> = self.priorities.essentials().cloned().collect();
        candidate.extend(self.catalog.members_of(&self.active_contexts).cloned());
        candidate.extend(self.pinned.iter().cloned());
        candidate
    }

    /// Enforce the cap on `candidate`, install it as the active set and
    /// emit the resulting transitions.
    fn settle(
        &mut self,
        mut candidate: HashSet<String>,
        cause: ActivationCause,
        events: &mut Vec<ActivationEvent>,
    ) {
        let outcome = {
            let priorities = &self.priorities;
            let first_seen = &self.first_seen;
            enforce_cap(
                &mut candidate,
                self.cap,
                |n| priorities.tier(n),
                |n| first_seen.get(n),
            )
        };
        self.counters.cap_passes = self.counters.cap_passes.saturating_add(1);

        let previous = std::mem::replace(&mut self.active, candidate);

        let mut added: Vec<&String> = self.active.difference(&previous).collect();
        added.sort_by_key(|n| self.first_seen.get(n));
        for name in added {
            let cause = if self.priorities.is_essential(name) {
                ActivationCause::Essential
            } else if self.pinned.contains(name) {
                cause
            } else {
                ActivationCause::Context
            };
            events.push(ActivationEvent::Activated {
                metadata: metadata(),
                capability: name.clone(),
                cause,
            });
        }

        let evicted: HashSet<&String> = outcome.evicted.iter().collect();
        let mut dropped: Vec<&String> = previous
            .difference(&self.active)
            .filter(|n| !evicted.contains(n))
            .collect();
        dropped.sort_by_key(|n| self.first_seen.get(n));
        for name in dropped {
            events.push(ActivationEvent::Deactivated {
                metadata: metadata(),
                capability: name.clone(),
            });
        }

        self.record_outcome(outcome, events);
    }

    fn record_outcome(&mut self, outcome: CapOutcome, events: &mut Vec<ActivationEvent>) {
        self.counters.over_cap_by = outcome.over_cap_by;

        if outcome.budget_exceeded() {
            self.counters.budget_exceeded = self.counters.budget_exceeded.saturating_add(1);
            warn!(
                cap = self.cap,
                active = self.active.len(),
                over_cap_by = outcome.over_cap_by,
                "Essential capabilities exceed the cap"
            );
            events.push(ActivationEvent::BudgetExceeded {
                metadata: metadata(),
                cap: self.cap,
                active: self.active.len(),
            });
        }

        if outcome.evicted.is_empty() {
            return;
        }
        for name in &outcome.evicted {
            self.pinned.remove(name);
        }
        let count = u64::try_from(outcome.evicted.len()).unwrap_or(u64::MAX);
        self.counters.evictions_total = self.counters.evictions_total.saturating_add(count);

        info!(
            cap = self.cap,
            evicted = outcome.evicted.len(),
            "Evicted capabilities to stay within cap"
        );
        events.push(ActivationEvent::Evicted {
            metadata: metadata(),
            capabilities: outcome.evicted.clone(),
            cap: self.cap,
        });
        self.counters.last_evicted = outcome.evicted;
    }

    // -- Introspection -----------------------------------------------------

    pub(crate) fn list_active(&self) -> Vec<String> {
        let mut names: Vec<String> = self.active.iter().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn stats(&self) -> ActivationStats {
        ActivationStats {
            cap: self.cap,
            active_count: self.active.len(),
            essential_count: self.priorities.essential_count(),
            registered_count: self.registry.len(),
            context_count: self.catalog.group_count(),
            active_contexts: self.active_contexts.iter().cloned().collect(),
            pinned_count: self.pinned.len(),
            over_cap_by: self.counters.over_cap_by,
            budget_exceeded: self.counters.budget_exceeded,
            evictions_total: self.counters.evictions_total,
            last_evicted: self.counters.last_evicted.clone(),
            recomputations: self.counters.recomputations,
            cap_passes: self.counters.cap_passes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_is_never_reassigned() {
        let mut seen = FirstSeen::default();
        seen.observe("b");
        seen.observe("a");
        seen.observe("b");
        assert_eq!(seen.get("b"), 0);
        assert_eq!(seen.get("a"), 1);
        assert_eq!(seen.get("never"), u64::MAX);
    }

    #[test]
    fn test_evicted_names_are_unpinned() {
        let mut state = ManagerState::new(1);
        let mut events = Vec::new();
        state.set_priority("keep", Tier::High, &mut events);

        let names = vec!["drop".to_owned(), "keep".to_owned()];
        let retained = state.activate_many(&names, ActivationCause::Manual, &mut events);

        assert_eq!(retained, 1);
        assert_eq!(state.list_active(), vec!["keep"]);
        assert!(!state.pinned.contains("drop"));
        assert_eq!(state.stats().last_evicted, vec!["drop"]);
    }

    #[test]
    fn test_deregister_clears_stale_overflow() {
        let mut state = ManagerState::new(1);
        let mut events = Vec::new();
        for name in ["e1", "e2"] {
            state.register(
                CapabilityDescriptor::new(name).with_tier(Tier::Essential),
                &mut events,
            );
        }
        assert_eq!(state.stats().over_cap_by, 1);

        assert!(state.deregister("e2", &mut events));
        let stats = state.stats();
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.over_cap_by, 0);
        assert!(!state.priorities.is_essential("e2"));
        assert!(!state.deregister("e2", &mut events));
    }

    #[test]
    fn test_deregister_refills_freed_slot() {
        let mut state = ManagerState::new(2);
        let mut events = Vec::new();
        state.register(
            CapabilityDescriptor::new("pinned").with_tier(Tier::High),
            &mut events,
        );
        state.activate_many(&["pinned".to_owned()], ActivationCause::Manual, &mut events);
        state.add_context_group(ContextGroup::new("ctx", ["a", "b"]), &mut events);
        state.set_active_contexts(BTreeSet::from(["ctx".to_owned()]), false, &mut events);
        assert_eq!(state.list_active(), vec!["b", "pinned"]);

        assert!(state.deregister("pinned", &mut events));
        assert_eq!(state.list_active(), vec!["a", "b"]);
    }

    #[test]
    fn test_deregistered_member_stays_out_until_recompute() {
        let mut state = ManagerState::new(5);
        let mut events = Vec::new();
        state.register(CapabilityDescriptor::new("a"), &mut events);
        state.add_context_group(ContextGroup::new("ctx", ["a", "b"]), &mut events);
        state.set_active_contexts(BTreeSet::from(["ctx".to_owned()]), false, &mut events);

        assert!(state.deregister("a", &mut events));
        assert_eq!(state.list_active(), vec!["b"]);

        state.recompute(&mut events);
        assert_eq!(state.list_active(), vec!["a", "b"]);
    }

    #[test]
    fn test_deregister_keeps_non_essential_tier() {
        let mut state = ManagerState::new(2);
        let mut events = Vec::new();
        state.set_priority("docs:search", Tier::High, &mut events);
        state.add_context_group(
            ContextGroup::new("docs", ["docs:search", "web:fetch", "web:crawl"]),
            &mut events,
        );
        state.register(CapabilityDescriptor::new("docs:search"), &mut events);

        assert!(state.deregister("docs:search", &mut events));
        assert_eq!(state.priorities.tier("docs:search"), Tier::High);

        state.set_active_contexts(BTreeSet::from(["docs".to_owned()]), false, &mut events);
        assert_eq!(state.list_active(), vec!["docs:search", "web:crawl"]);
    }
}
