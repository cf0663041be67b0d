//! Shared setup for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use capgate::{ActivationManager, Tier};
use capgate_test::{assign_tier, capability_names, test_manager_with_essentials};

/// Context groups used by the capacity scenarios, in registration order.
pub const GROUPS: [(&str, &str); 3] = [
    ("documentation", "docs"),
    ("kanban", "board"),
    ("payment", "pay"),
];

/// Members per context group.
pub const GROUP_SIZE: usize = 20;

/// Tier of the member at `index` inside its group.
pub fn member_tier(index: usize) -> Tier {
    match index % 3 {
        0 => Tier::High,
        1 => Tier::Medium,
        _ => Tier::Low,
    }
}

/// Manager with the six essentials and three 20-member groups whose
/// members cycle through High, Medium and Low. No context is active.
pub fn populated_manager(cap: usize) -> Arc<ActivationManager> {
    let manager = test_manager_with_essentials(cap);
    for (context, prefix) in GROUPS {
        manager
            .add_context_group(context, capability_names(prefix, GROUP_SIZE))
            .unwrap();
    }
    for (_, prefix) in GROUPS {
        let names = capability_names(prefix, GROUP_SIZE);
        for tier in [Tier::High, Tier::Medium, Tier::Low] {
            let members: Vec<String> = names
                .iter()
                .enumerate()
                .filter(|(index, _)| member_tier(*index) == tier)
                .map(|(_, name)| name.clone())
                .collect();
            assign_tier(&manager, &members, tier);
        }
    }
    manager
}

/// Low-tier group members in first-seen order.
pub fn low_members_in_order() -> Vec<String> {
    GROUPS
        .iter()
        .flat_map(|(_, prefix)| {
            capability_names(prefix, GROUP_SIZE)
                .into_iter()
                .enumerate()
                .filter(|(index, _)| member_tier(*index) == Tier::Low)
                .map(|(_, name)| name)
        })
        .collect()
}

/// Every name that is essential must be active, the active set stays
/// within the cap unless essentials alone exceed it, and the reported
/// overflow matches the live active set.
pub fn assert_invariants(manager: &ActivationManager, universe: &[String]) {
    let stats = manager.stats();
    assert!(
        stats.active_count <= stats.cap.max(stats.essential_count),
        "active set too large: {stats:?}"
    );
    for name in universe {
        if manager.is_essential(name) {
            assert!(manager.is_active(name), "essential {name} is not active");
        }
    }
    assert_eq!(
        stats.over_cap_by,
        stats.active_count.saturating_sub(stats.cap),
        "stale overflow: {stats:?}"
    );
}
