//! Scoped context widening.

use std::collections::BTreeSet;

use tokio::sync::MutexGuard;
use tracing::debug;

use super::ActivationManager;
use crate::error::CapgateResult;

/// Guard for a temporary widening of the active contexts.
///
/// Created by [`ActivationManager::enter_context`]. While it lives the
/// active contexts include the extra names; when it is dropped they are set
/// back to the checkpoint taken on entry and the active set is recomputed.
/// Dropping happens on every exit path, including early returns, panics and
/// futures abandoned mid-flight.
///
/// The outermost scope holds the manager's scope lock, so at most one
/// widening is in flight at a time. Nested widening goes through
/// [`nest`](Self::nest); the borrow keeps nested scopes strictly LIFO.
///
/// Restoration replaces the active contexts with the checkpoint, so a
/// `set_active_contexts` call made while a scope is open is overwritten
/// when the scope exits.
#[must_use = "the widening is undone as soon as the scope is dropped"]
pub struct ContextScope<'a> {
    manager: &'a ActivationManager,
    checkpoint: BTreeSet<String>,
    // Declared last so the lock is released after the restore in `drop`.
    _permit: Option<MutexGuard<'a, ()>>,
}

impl<'a> ContextScope<'a> {
    pub(super) fn open(
        manager: &'a ActivationManager,
        extra: BTreeSet<String>,
        permit: Option<MutexGuard<'a, ()>>,
    ) -> Self {
        let checkpoint = manager.mutate(|state, events| {
            let checkpoint = state.active_contexts.clone();
            let widened: BTreeSet<String> = checkpoint.union(&extra).cloned().collect();
            state.set_active_contexts(widened, true, events);
            checkpoint
        });
        debug!(extra = ?extra, outermost = permit.is_some(), "Entered context scope");

        Self {
            manager,
            checkpoint,
            _permit: permit,
        }
    }

    /// Widen further inside this scope.
    ///
    /// The returned scope restores this scope's widened contexts when it is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CapgateError::InvalidArgument`](crate::CapgateError) if any
    /// context name is empty.
    pub fn nest<I, S>(&mut self, extra: I) -> CapgateResult<ContextScope<'_>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extra = super::context_names(extra)?;
        Ok(ContextScope::open(self.manager, extra, None))
    }

    /// Contexts that will be restored when this scope is dropped.
    #[must_use]
    pub fn checkpoint(&self) -> Vec<String> {
        self.checkpoint.iter().cloned().collect()
    }

    /// The manager this scope widens.
    #[must_use]
    pub fn manager(&self) -> &ActivationManager {
        self.manager
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        let checkpoint = std::mem::take(&mut self.checkpoint);
        debug!(restoring = ?checkpoint, "Leaving context scope");
        self.manager.mutate(|state, events| {
            state.set_active_contexts(checkpoint, true, events);
        });
    }
}

impl std::fmt::Debug for ContextScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextScope")
            .field("checkpoint", &self.checkpoint)
            .field("outermost", &self._permit.is_some())
            .finish_non_exhaustive()
    }
}
