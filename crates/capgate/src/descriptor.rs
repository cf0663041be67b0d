//! Capability descriptors and the handler trait.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::tier::Tier;

/// Error returned by a handler. Converted by the dispatcher into
/// [`ExecutionError::HandlerExecutionError`](crate::ExecutionError).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable failure description.
    pub message: String,
}

impl HandlerError {
    /// Create a handler error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("invalid parameters: {e}"))
    }
}

/// Executable backing of a capability.
///
/// Handlers run outside the manager lock and may be long-running. They
/// receive the caller's cancellation token and should return promptly once
/// it fires; the dispatcher stops waiting either way.
#[async_trait::async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Run the capability with the given parameters.
    async fn call(&self, params: Value, cancel: CancellationToken) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`CapabilityHandler`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait::async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn call(&self, params: Value, _cancel: CancellationToken) -> Result<Value, HandlerError> {
        (self.f)(params).await
    }
}

/// Wrap an async closure as a shareable handler.
///
/// ```
/// use capgate::{HandlerError, handler_fn};
///
/// let echo = handler_fn(|params| async move { Ok::<_, HandlerError>(params) });
/// # let _ = echo;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn CapabilityHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Registry entry for one capability.
///
/// A descriptor without a handler is valid: executing it yields the
/// documented stub result instead of running anything.
#[derive(Clone)]
pub struct CapabilityDescriptor {
    /// Unique capability name, e.g. `"db:query"`.
    pub name: String,
    /// Executable backing, if the integration is wired up.
    pub handler: Option<Arc<dyn CapabilityHandler>>,
    /// Declared tier. `None` keeps any tier already assigned to the name
    /// (or `Low` if there is none).
    pub tier: Option<Tier>,
}

impl CapabilityDescriptor {
    /// Create a handler-less descriptor with no declared tier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: None,
            tier: None,
        }
    }

    /// Attach an executable handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Declare the tier.
    #[must_use]
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Whether an executable handler is attached.
    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("name", &self.name)
            .field("has_handler", &self.handler.is_some())
            .field("tier", &self.tier)
            .finish()
    }
}
