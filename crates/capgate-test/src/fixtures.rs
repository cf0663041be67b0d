//! Test fixtures for common capgate setups.

use std::sync::Arc;

use capgate::{ActivationManager, Dispatcher, Tier};

/// Six always-on capabilities used by the scenario tests.
pub const ESSENTIAL_CAPABILITIES: [&str; 6] = [
    "sequential_analyze",
    "memory:recall",
    "memory:store",
    "fs:read",
    "fs:write",
    "shell:exec",
];

/// Create a shared manager with the given cap and no essentials.
///
/// # Panics
///
/// Panics if `cap` is zero.
#[must_use]
pub fn test_manager(cap: usize) -> Arc<ActivationManager> {
    Arc::new(ActivationManager::new(cap).expect("cap must be positive"))
}

/// Create a shared manager with [`ESSENTIAL_CAPABILITIES`] registered.
///
/// # Panics
///
/// Panics if `cap` is zero.
#[must_use]
pub fn test_manager_with_essentials(cap: usize) -> Arc<ActivationManager> {
    Arc::new(
        ActivationManager::builder()
            .cap(cap)
            .essentials(ESSENTIAL_CAPABILITIES)
            .build()
            .expect("cap must be positive"),
    )
}

/// Create a dispatcher over `manager` with no timeout and no cache.
#[must_use]
pub fn test_dispatcher(manager: &Arc<ActivationManager>) -> Dispatcher {
    Dispatcher::new(Arc::clone(manager))
}

/// `count` capability names of the form `"{prefix}:{index:02}"`.
#[must_use]
pub fn capability_names(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}:{i:02}")).collect()
}

/// Assign `tier` to every name.
///
/// # Panics
///
/// Panics if a name is empty.
pub fn assign_tier(manager: &ActivationManager, names: &[String], tier: Tier) {
    for name in names {
        manager
            .set_priority(name, tier)
            .expect("capability names must not be empty");
    }
}

/// A small configuration exercising every section.
#[must_use]
pub fn test_config_toml() -> &'static str {
    r#"
[activation]
cap = 5
essentials = ["sequential_analyze"]

[contexts]
documentation = ["docs:search", "web:fetch"]
kanban = ["board:list", "board:move", "board:archive"]

[presets]
writer = ["documentation", "kanban"]

[priorities]
"board:archive" = "low"
"docs:search" = "high"

[dispatch]
timeout_secs = 5
cache_ttl_secs = 60
cacheable = ["docs:search"]
"#
}
