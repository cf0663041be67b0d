//! Capability registry.
//!
//! Plain storage keyed by capability name. Locking and the side effects of
//! registration on the active set live in the
//! [`ActivationManager`](crate::ActivationManager).

use std::collections::HashMap;

use crate::descriptor::CapabilityDescriptor;

/// Descriptors by capability name.
#[derive(Debug, Default, Clone)]
pub struct CapabilityRegistry {
    descriptors: HashMap<String, CapabilityDescriptor>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a descriptor, returning the one it replaced.
    pub fn insert(&mut self, descriptor: CapabilityDescriptor) -> Option<CapabilityDescriptor> {
        self.descriptors.insert(descriptor.name.clone(), descriptor)
    }

    /// Remove a descriptor.
    pub fn remove(&mut self, name: &str) -> Option<CapabilityDescriptor> {
        self.descriptors.remove(name)
    }

    /// Look up a descriptor.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.descriptors.get(name)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.keys().cloned().collect();
        names.sort();
        names
    }
}
