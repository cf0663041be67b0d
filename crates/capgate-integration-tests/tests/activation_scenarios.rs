//! Capacity and eviction behaviour across whole activation workflows.

mod common;

use std::collections::BTreeSet;

use capgate::{ActivationEvent, ActivationManager, CapabilityDescriptor, Tier};
use capgate_test::{ESSENTIAL_CAPABILITIES, capability_names, test_manager_with_essentials};
use common::{GROUP_SIZE, GROUPS, assert_invariants, low_members_in_order, populated_manager};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

#[test]
fn test_three_contexts_fill_cap_and_evict_lowest_tier_first() {
    let manager = populated_manager(50);
    assert_eq!(manager.list_active().len(), ESSENTIAL_CAPABILITIES.len());

    manager
        .set_active_contexts(GROUPS.iter().map(|(context, _)| *context))
        .unwrap();

    let active: BTreeSet<String> = manager.list_active().into_iter().collect();
    assert_eq!(active.len(), 50);
    for name in ESSENTIAL_CAPABILITIES {
        assert!(active.contains(name), "essential {name} missing");
    }

    let expected_evicted: Vec<String> = low_members_in_order().into_iter().take(16).collect();
    let stats = manager.stats();
    assert_eq!(stats.last_evicted, expected_evicted);
    assert_eq!(stats.evictions_total, 16);
    assert_eq!(stats.over_cap_by, 0);
    for name in &expected_evicted {
        assert!(!active.contains(name), "{name} should have been evicted");
    }

    // The two Low members seen last survive.
    let survivors: Vec<String> = low_members_in_order().into_iter().skip(16).collect();
    assert_eq!(survivors, vec!["pay:14", "pay:17"]);
    for name in &survivors {
        assert!(active.contains(name));
    }
}

#[test]
fn test_essential_cannot_be_deactivated() {
    let manager = test_manager_with_essentials(50);

    assert!(!manager.deactivate("sequential_analyze"));
    assert!(manager.is_active("sequential_analyze"));

    manager.set_active_contexts(Vec::<String>::new()).unwrap();
    manager.recompute();
    assert!(manager.is_active("sequential_analyze"));
}

#[test]
fn test_shrinking_contexts_releases_members() {
    let manager = populated_manager(50);
    manager
        .set_active_contexts(["documentation", "kanban", "payment"])
        .unwrap();
    assert_eq!(manager.list_active().len(), 50);

    manager.set_active_contexts(["kanban"]).unwrap();
    let active = manager.list_active();
    assert_eq!(active.len(), ESSENTIAL_CAPABILITIES.len() + GROUP_SIZE);
    assert!(active.iter().all(|name| !name.starts_with("docs:")));
    assert!(active.iter().all(|name| !name.starts_with("pay:")));

    // Evicted members of a still-active group come back once there is room.
    assert!(manager.is_active("board:02"));
}

#[test]
fn test_manual_activation_competes_by_tier() {
    let manager = populated_manager(50);
    manager
        .set_active_contexts(["documentation", "kanban", "payment"])
        .unwrap();

    manager
        .register(CapabilityDescriptor::new("db:query").with_tier(Tier::High))
        .unwrap();
    assert!(manager.activate("db:query").unwrap());
    assert_eq!(manager.list_active().len(), 50);
    // The next Low member in first-seen order made room.
    assert!(!manager.is_active("pay:14"));
    assert!(manager.is_active("pay:17"));

    // A Low newcomer is seen last, so the older Low survivor goes instead.
    assert!(manager.activate("screenshot").unwrap());
    assert!(!manager.is_active("pay:17"));
    assert!(manager.is_registered("screenshot"));

    assert!(manager.activate("camera").unwrap());
    assert!(!manager.is_active("screenshot"));
    assert_eq!(manager.list_active().len(), 50);
}

#[test]
fn test_essential_overflow_reports_budget_exceeded() {
    let manager = test_manager_with_essentials(4);
    let mut events = manager.subscribe();

    let stats = manager.stats();
    assert_eq!(stats.active_count, ESSENTIAL_CAPABILITIES.len());
    assert_eq!(stats.over_cap_by, 2);
    assert!(stats.is_over_cap());
    assert!(stats.budget_exceeded > 0);

    // Nothing non-essential gets in while essentials overflow.
    manager.add_context_group("docs", ["docs:search"]).unwrap();
    manager.set_active_contexts(["docs"]).unwrap();
    assert!(!manager.is_active("docs:search"));

    let drained = events.drain();
    assert!(drained.iter().any(|event| matches!(
        &**event,
        ActivationEvent::BudgetExceeded { cap: 4, active: 6, .. }
    )));
}

#[test]
fn test_deregistering_essentials_frees_room_for_contexts() {
    let manager = test_manager_with_essentials(4);
    manager.add_context_group("docs", ["docs:search"]).unwrap();
    manager.set_active_contexts(["docs"]).unwrap();

    assert!(manager.deregister(ESSENTIAL_CAPABILITIES[0]));
    assert!(manager.deregister(ESSENTIAL_CAPABILITIES[1]));
    let stats = manager.stats();
    assert_eq!(stats.over_cap_by, 0);
    assert_eq!(stats.active_count, 4);
    assert!(!manager.is_active("docs:search"));

    assert!(manager.deregister(ESSENTIAL_CAPABILITIES[2]));
    assert!(manager.is_active("docs:search"));
    assert_eq!(manager.stats().active_count, 4);
}

#[test]
fn test_deregistered_capability_keeps_its_tier() {
    let manager = ActivationManager::new(2).unwrap();
    manager.set_priority("docs:search", Tier::High).unwrap();
    manager
        .add_context_group("docs", ["docs:search", "web:fetch", "web:crawl"])
        .unwrap();
    manager
        .register(CapabilityDescriptor::new("docs:search"))
        .unwrap();

    assert!(manager.deregister("docs:search"));
    assert_eq!(manager.tier("docs:search"), Tier::High);

    manager.set_active_contexts(["docs"]).unwrap();
    assert_eq!(manager.list_active(), vec!["docs:search", "web:crawl"]);
    assert_eq!(manager.stats().last_evicted, vec!["web:fetch"]);
}

#[test]
fn test_deactivated_member_returns_on_recompute() {
    let manager = populated_manager(100);
    manager.set_active_contexts(["documentation"]).unwrap();

    assert!(manager.deactivate("docs:00"));
    assert!(!manager.is_active("docs:00"));
    assert!(!manager.deactivate("docs:00"));

    manager.recompute();
    assert!(manager.is_active("docs:00"));
}

#[test]
fn test_invariants_hold_over_random_operations() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let manager = populated_manager(30);

    let mut universe: Vec<String> = ESSENTIAL_CAPABILITIES
        .iter()
        .map(|name| (*name).to_owned())
        .collect();
    for (_, prefix) in GROUPS {
        universe.extend(capability_names(prefix, GROUP_SIZE));
    }
    universe.extend(capability_names("extra", 15));

    let contexts = ["documentation", "kanban", "payment", "adhoc", "missing"];
    let tiers = [Tier::Essential, Tier::High, Tier::Medium, Tier::Low];

    for _ in 0..500 {
        let name = universe.choose(&mut rng).unwrap().clone();
        match rng.gen_range(0..9) {
            0 => {
                let tier = *tiers.choose(&mut rng).unwrap();
                manager
                    .register(CapabilityDescriptor::new(name).with_tier(tier))
                    .unwrap();
            },
            1 => {
                manager.deregister(&name);
            },
            2 => {
                manager.activate(&name).unwrap();
            },
            3 => {
                manager.deactivate(&name);
            },
            4 => {
                let chosen: Vec<&str> = contexts
                    .iter()
                    .copied()
                    .filter(|_| rng.gen_bool(0.5))
                    .collect();
                manager.set_active_contexts(chosen).unwrap();
            },
            5 => {
                // Essential promotions are rarer so the set stays mostly under the cap.
                let tier = if rng.gen_bool(0.1) {
                    Tier::Essential
                } else {
                    *tiers[1..].choose(&mut rng).unwrap()
                };
                manager.set_priority(&name, tier).unwrap();
            },
            6 => {
                let members: Vec<String> = universe
                    .choose_multiple(&mut rng, 8)
                    .cloned()
                    .collect();
                manager.add_context_group("adhoc", members).unwrap();
            },
            7 => {
                let batch: Vec<String> = universe
                    .choose_multiple(&mut rng, 5)
                    .cloned()
                    .collect();
                manager.activate_many(batch).unwrap();
            },
            _ => manager.recompute(),
        }
        assert_invariants(&manager, &universe);
    }
}
