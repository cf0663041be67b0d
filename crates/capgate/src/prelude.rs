//! Prelude module - commonly used types for convenient import.
//!
//! Use `use capgate::prelude::*;` to import all essential types.

// Errors
pub use crate::{CapgateError, CapgateResult, ExecutionError};

// Capabilities
pub use crate::{CapabilityDescriptor, CapabilityHandler, HandlerError, Tier, handler_fn};

// Manager
pub use crate::{ActivationManager, ActivationStats, ContextScope};

// Dispatch
pub use crate::{Dispatcher, ExecuteOptions, ExecutionResult, ResultCache};
