//! Priority table mapping capability names to tiers.

use std::collections::HashMap;

use crate::tier::Tier;

/// Tier assignments. Names without an entry are [`Tier::Low`].
///
/// The essential set is derived from this table: a capability is essential
/// exactly when its tier is [`Tier::Essential`].
#[derive(Debug, Default, Clone)]
pub struct PriorityTable {
    tiers: HashMap<String, Tier>,
}

impl PriorityTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a tier, returning the previous explicit assignment.
    pub fn set(&mut self, name: impl Into<String>, tier: Tier) -> Option<Tier> {
        self.tiers.insert(name.into(), tier)
    }

    /// Drop the assignment for `name`.
    pub fn remove(&mut self, name: &str) -> Option<Tier> {
        self.tiers.remove(name)
    }

    /// Effective tier of `name`.
    #[must_use]
    pub fn tier(&self, name: &str) -> Tier {
        self.tiers.get(name).copied().unwrap_or_default()
    }

    /// Explicit assignment for `name`, if any.
    #[must_use]
    pub fn explicit(&self, name: &str) -> Option<Tier> {
        self.tiers.get(name).copied()
    }

    /// Whether `name` is essential.
    #[must_use]
    pub fn is_essential(&self, name: &str) -> bool {
        self.tier(name) == Tier::Essential
    }

    /// Names assigned the essential tier.
    pub fn essentials(&self) -> impl Iterator<Item = &String> {
        self.tiers
            .iter()
            .filter(|(_, tier)| **tier == Tier::Essential)
            .map(|(name, _)| name)
    }

    /// Number of essential names.
    #[must_use]
    pub fn essential_count(&self) -> usize {
        self.essentials().count()
    }
}
