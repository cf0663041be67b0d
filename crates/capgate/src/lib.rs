//! Capgate - bounded-capacity capability activation manager.
//!
//! This crate decides which capabilities may be enabled at once under a
//! hard cap:
//! - A registry of capability descriptors with optional handlers
//! - A context catalog of named capability bundles and presets over them
//! - A priority table whose tiers drive eviction when the cap is exceeded
//! - An [`ActivationManager`] that derives the active set and supports
//!   scoped, self-restoring context widening
//! - A [`Dispatcher`] that runs capabilities by name and reports every
//!   outcome as a structured [`ExecutionResult`]
//! - A TTL [`ResultCache`] for idempotent, expensive capabilities
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use capgate::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> CapgateResult<()> {
//! let manager = Arc::new(
//!     ActivationManager::builder()
//!         .cap(50)
//!         .essentials(["sequential_analyze"])
//!         .build()?,
//! );
//! manager.register(
//!     CapabilityDescriptor::new("db:query")
//!         .with_tier(Tier::High)
//!         .with_handler(handler_fn(|params| async move {
//!             Ok::<_, HandlerError>(json!({ "rows": [], "sql": params["sql"] }))
//!         })),
//! )?;
//! manager.add_context_group("reporting", ["db:query"])?;
//!
//! let dispatcher = Dispatcher::new(Arc::clone(&manager));
//! let result = manager
//!     .with_context(["reporting"], || dispatcher.execute("db:query", json!({ "sql": "select 1" })))
//!     .await?;
//!
//! assert!(result.success);
//! assert!(!result.metadata.auto_activated);
//! assert!(manager.active_contexts().is_empty());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod bootstrap;
pub mod budget;
pub mod cache;
pub mod catalog;
pub mod descriptor;
/// Error types and results for the manager and dispatcher.
pub mod error;
pub mod manager;
pub mod priority;
pub mod registry;
pub mod stats;
pub mod tier;

mod dispatch;

pub use bootstrap::{dispatcher_from_config, manager_from_config};
pub use budget::CapOutcome;
pub use cache::{CacheStats, ResultCache};
pub use catalog::{ContextCatalog, ContextGroup};
pub use descriptor::{CapabilityDescriptor, CapabilityHandler, FnHandler, HandlerError, handler_fn};
pub use dispatch::{Dispatcher, ExecuteOptions, ExecutionMetadata, ExecutionResult};
pub use error::{CapgateError, CapgateResult, ExecutionError};
pub use manager::{ActivationManager, ActivationManagerBuilder, ContextScope, DEFAULT_CAP};
pub use priority::PriorityTable;
pub use registry::CapabilityRegistry;
pub use stats::{ActivationStats, DispatchStats};
pub use tier::Tier;

// Re-exported so callers can subscribe without a direct dependency.
pub use capgate_events::{ActivationCause, ActivationEvent, EventBus, EventReceiver};
