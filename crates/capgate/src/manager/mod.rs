//! The activation manager.
//!
//! Owns the registry, context catalog and priority table, and derives the
//! active set from them:
//!
//! ```text
//! candidate = essentials ∪ members(active contexts) ∪ pinned activations
//! active    = candidate trimmed to the cap by priority eviction
//! ```
//!
//! All bookkeeping shares one lock and every operation is a short
//! synchronous critical section. Events are published after the lock is
//! released.

mod scope;
mod state;

pub use scope::ContextScope;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use capgate_events::{ActivationCause, ActivationEvent, EventBus, EventReceiver};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::catalog::ContextGroup;
use crate::descriptor::CapabilityDescriptor;
use crate::error::{CapgateError, CapgateResult, require_name};
use crate::stats::ActivationStats;
use crate::tier::Tier;
use state::ManagerState;

/// Default cap on simultaneously active capabilities.
pub const DEFAULT_CAP: usize = 50;

/// Validate context names and collect them into a set.
fn context_names<I, S>(names: I) -> CapgateResult<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .map(|n| {
            let n = n.into();
            require_name(&n, "context")?;
            Ok(n)
        })
        .collect()
}

/// Descriptor snapshot handed to the dispatcher.
#[derive(Debug, Clone)]
pub(crate) struct Prepared {
    pub(crate) descriptor: CapabilityDescriptor,
    pub(crate) auto_activated: bool,
}

/// Builder for [`ActivationManager`].
#[derive(Debug, Clone)]
#[must_use]
pub struct ActivationManagerBuilder {
    cap: usize,
    essentials: Vec<String>,
    event_bus: Option<EventBus>,
}

impl Default for ActivationManagerBuilder {
    fn default() -> Self {
        Self {
            cap: DEFAULT_CAP,
            essentials: Vec::new(),
            event_bus: None,
        }
    }
}

impl ActivationManagerBuilder {
    /// Set the cap.
    pub fn cap(mut self, cap: usize) -> Self {
        self.cap = cap;
        self
    }

    /// Add always-on capabilities. They are registered without a handler
    /// and given the essential tier.
    pub fn essentials<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.essentials.extend(names.into_iter().map(Into::into));
        self
    }

    /// Publish events on an existing bus instead of a private one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Build the manager. Essentials are active immediately.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if the cap is zero or an
    /// essential name is empty.
    pub fn build(self) -> CapgateResult<ActivationManager> {
        if self.cap == 0 {
            return Err(CapgateError::InvalidArgument(
                "cap must be at least 1".to_owned(),
            ));
        }
        for name in &self.essentials {
            require_name(name, "capability")?;
        }

        let mut state = ManagerState::new(self.cap);
        let mut events = Vec::new();
        for name in self.essentials {
            state.register(
                CapabilityDescriptor::new(name).with_tier(Tier::Essential),
                &mut events,
            );
        }

        info!(
            cap = self.cap,
            essentials = state.priorities.essential_count(),
            "Activation manager initialized"
        );

        Ok(ActivationManager {
            state: RwLock::new(state),
            scope_lock: Mutex::new(()),
            events: self.event_bus.unwrap_or_default(),
        })
    }
}

/// Bounded-capacity capability activation manager.
///
/// Construct once at startup and share via `Arc`.
///
/// # Example
///
/// ```
/// use capgate::ActivationManager;
///
/// let manager = ActivationManager::builder()
///     .cap(3)
///     .essentials(["sequential_analyze"])
///     .build()
///     .unwrap();
///
/// manager
///     .add_context_group("documentation", ["docs:search", "web:fetch"])
///     .unwrap();
/// manager.set_active_contexts(["documentation"]).unwrap();
///
/// assert!(manager.is_active("sequential_analyze"));
/// assert!(manager.is_active("docs:search"));
/// assert!(!manager.deactivate("sequential_analyze"));
/// ```
#[derive(Debug)]
pub struct ActivationManager {
    state: RwLock<ManagerState>,
    scope_lock: Mutex<()>,
    events: EventBus,
}

impl ActivationManager {
    /// Start building a manager.
    pub fn builder() -> ActivationManagerBuilder {
        ActivationManagerBuilder::default()
    }

    /// Manager with the given cap and no essentials.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if `cap` is zero.
    pub fn new(cap: usize) -> CapgateResult<Self> {
        Self::builder().cap(cap).build()
    }

    fn read<R>(&self, f: impl FnOnce(&ManagerState) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Run `f` under the write lock, then publish the events it produced.
    fn mutate<R>(&self, f: impl FnOnce(&mut ManagerState, &mut Vec<ActivationEvent>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut state, &mut events)
        };
        for event in events {
            self.events.publish(event);
        }
        result
    }

    // -- Registry ----------------------------------------------------------

    /// Register or overwrite a capability.
    ///
    /// A declared tier is written into the priority table; a descriptor
    /// without one keeps the name's current tier.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if the name is empty.
    pub fn register(&self, descriptor: CapabilityDescriptor) -> CapgateResult<()> {
        require_name(&descriptor.name, "capability")?;
        self.mutate(|state, events| state.register(descriptor, events));
        Ok(())
    }

    /// Remove a capability and any activation or pin it holds.
    ///
    /// An essential tier is cleared with it; other tiers are kept. The active
    /// set is then recomputed with `name` held out, so freed slots refill and
    /// a context member returns on the next recompute. Returns `false` if the
    /// name was not registered.
    pub fn deregister(&self, name: &str) -> bool {
        self.mutate(|state, events| state.deregister(name, events))
    }

    /// Descriptor for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<CapabilityDescriptor> {
        self.read(|state| state.registry.get(name).cloned())
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.read(|state| state.registry.contains(name))
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        self.read(|state| state.registry.names())
    }

    // -- Context catalog ---------------------------------------------------

    /// Replace the members of a context group. Takes effect immediately if
    /// the context is active.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if the context name or a
    /// member name is empty.
    pub fn add_context_group<I, S>(&self, name: &str, members: I) -> CapgateResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        require_name(name, "context")?;
        let group = ContextGroup::new(name, members);
        for member in group.members() {
            require_name(member, "capability")?;
        }
        self.mutate(|state, events| state.add_context_group(group, events));
        Ok(())
    }

    /// Remove a context group, dropping it from the active contexts.
    /// Returns `false` if no such group exists.
    pub fn remove_context_group(&self, name: &str) -> bool {
        self.mutate(|state, events| state.remove_context_group(name, events))
    }

    /// Group named `name`.
    #[must_use]
    pub fn context_group(&self, name: &str) -> Option<ContextGroup> {
        self.read(|state| state.catalog.group(name).cloned())
    }

    /// Context group names, sorted.
    #[must_use]
    pub fn context_names(&self) -> Vec<String> {
        self.read(|state| state.catalog.group_names())
    }

    /// Define a preset: a named list of contexts applied together.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if any name is empty.
    pub fn add_preset<I, S>(&self, name: &str, contexts: I) -> CapgateResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        require_name(name, "preset")?;
        let contexts: Vec<String> = context_names(contexts)?.into_iter().collect();
        debug!(preset = %name, ?contexts, "Preset defined");
        self.mutate(|state, _| state.catalog.insert_preset(name, contexts));
        Ok(())
    }

    /// Make a preset's contexts the active contexts.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::UnknownPreset`] if no such preset exists.
    pub fn apply_preset(&self, name: &str) -> CapgateResult<()> {
        self.mutate(|state, events| {
            let contexts: BTreeSet<String> = state
                .catalog
                .preset(name)
                .ok_or_else(|| CapgateError::UnknownPreset(name.to_owned()))?
                .iter()
                .cloned()
                .collect();
            info!(preset = %name, "Applying preset");
            state.set_active_contexts(contexts, false, events);
            Ok(())
        })
    }

    /// Preset names, sorted.
    #[must_use]
    pub fn presets(&self) -> Vec<String> {
        self.read(|state| state.catalog.preset_names())
    }

    // -- Contexts ----------------------------------------------------------

    /// Replace the active contexts and recompute the active set.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if any name is empty.
    pub fn set_active_contexts<I, S>(&self, names: I) -> CapgateResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let contexts = context_names(names)?;
        self.mutate(|state, events| state.set_active_contexts(contexts, false, events));
        Ok(())
    }

    /// Active context names, sorted.
    #[must_use]
    pub fn active_contexts(&self) -> Vec<String> {
        self.read(|state| state.active_contexts.iter().cloned().collect())
    }

    /// Widen the active contexts until the returned scope is dropped.
    ///
    /// Waits while another scope is open.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if any name is empty.
    pub async fn enter_context<I, S>(&self, extra: I) -> CapgateResult<ContextScope<'_>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extra = context_names(extra)?;
        let permit = self.scope_lock.lock().await;
        Ok(ContextScope::open(self, extra, Some(permit)))
    }

    /// Run `op` with `extra` contexts added, restoring the previous contexts
    /// on every exit path.
    ///
    /// Calling `with_context` again from inside `op` waits forever; nest
    /// through [`ContextScope::nest`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if any name is empty. The
    /// output of `op` is returned as is, errors included.
    pub async fn with_context<I, S, F, Fut, T>(&self, extra: I, op: F) -> CapgateResult<T>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let scope = self.enter_context(extra).await?;
        let output = op().await;
        drop(scope);
        Ok(output)
    }

    // -- Activation --------------------------------------------------------

    /// Pin `name` into the active set, registering it if unknown, then
    /// enforce the cap. Returns whether `name` survived the cap pass.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if the name is empty.
    pub fn activate(&self, name: &str) -> CapgateResult<bool> {
        require_name(name, "capability")?;
        let retained = self.mutate(|state, events| {
            state.activate_many(&[name.to_owned()], ActivationCause::Manual, events)
        });
        Ok(retained == 1)
    }

    /// Activate several names with a single cap pass. Returns how many of
    /// the distinct names are active afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if any name is empty;
    /// nothing is activated in that case.
    pub fn activate_many<I, S>(&self, names: I) -> CapgateResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        for name in &names {
            require_name(name, "capability")?;
        }
        Ok(self.mutate(|state, events| {
            state.activate_many(&names, ActivationCause::Manual, events)
        }))
    }

    /// Remove `name` from the active set.
    ///
    /// Returns `false` for essential capabilities and names that are not
    /// active. A context member stays off until the next recomputation.
    pub fn deactivate(&self, name: &str) -> bool {
        self.mutate(|state, events| state.deactivate(name, events))
    }

    /// Assign a tier. Recomputes when the essential set changes or the
    /// active set is over the cap.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`] if the name is empty.
    pub fn set_priority(&self, name: &str, tier: Tier) -> CapgateResult<()> {
        require_name(name, "capability")?;
        self.mutate(|state, events| state.set_priority(name, tier, events));
        Ok(())
    }

    /// Effective tier of `name`.
    #[must_use]
    pub fn tier(&self, name: &str) -> Tier {
        self.read(|state| state.priorities.tier(name))
    }

    /// Whether `name` is essential.
    #[must_use]
    pub fn is_essential(&self, name: &str) -> bool {
        self.read(|state| state.priorities.is_essential(name))
    }

    /// Rebuild the active set from essentials, active contexts and pinned
    /// activations. Clears the effect of earlier `deactivate` calls on
    /// context members.
    pub fn recompute(&self) {
        self.mutate(ManagerState::recompute);
    }

    /// Look up `name` for execution, activating it first if needed.
    pub(crate) fn prepare_execution(&self, name: &str) -> Option<Prepared> {
        self.mutate(|state, events| {
            let descriptor = state.registry.get(name)?.clone();
            let auto_activated = !state.active.contains(name);
            if auto_activated {
                let retained = state.activate_many(
                    &[name.to_owned()],
                    ActivationCause::AutoActivated,
                    events,
                );
                debug!(capability = %name, retained = retained == 1, "Auto-activated for execution");
            }
            Some(Prepared {
                descriptor,
                auto_activated,
            })
        })
    }

    // -- Introspection -----------------------------------------------------

    /// Whether `name` is in the active set.
    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        self.read(|state| state.active.contains(name))
    }

    /// Active capability names, sorted.
    #[must_use]
    pub fn list_active(&self) -> Vec<String> {
        self.read(ManagerState::list_active)
    }

    /// The configured cap.
    #[must_use]
    pub fn cap(&self) -> usize {
        self.read(ManagerState::cap)
    }

    /// Snapshot of counters and sizes.
    #[must_use]
    pub fn stats(&self) -> ActivationStats {
        self.read(ManagerState::stats)
    }

    /// Subscribe to activation events.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The bus events are published on.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }
}
