//! Error types.
//!
//! [`CapgateError`] covers programmer errors that fail fast. Execution
//! failures are not errors at this level: the dispatcher reports them as
//! [`ExecutionError`] values inside an `ExecutionResult`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned synchronously by the manager API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapgateError {
    /// A caller passed an unusable argument (empty name, zero cap, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No preset with this name exists in the context catalog.
    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    /// A configuration value could not be converted into runtime types.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for manager operations.
pub type CapgateResult<T> = Result<T, CapgateError>;

/// Soft outcome of a failed capability execution.
///
/// Serialized with a `kind` tag so callers can branch on it without string
/// matching on messages.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ExecutionError {
    /// The capability is not registered.
    #[error("capability '{name}' is not registered")]
    UnregisteredCapability {
        /// Requested capability name.
        name: String,
    },

    /// The handler returned an error or panicked.
    #[error("handler failed: {message}")]
    HandlerExecutionError {
        /// Error or panic message.
        message: String,
    },

    /// The handler did not finish within the allotted time.
    #[error("handler timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The caller's cancellation token fired before the handler finished.
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Stable label of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnregisteredCapability { .. } => "UnregisteredCapability",
            Self::HandlerExecutionError { .. } => "HandlerExecutionError",
            Self::Timeout { .. } => "Timeout",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Reject empty or whitespace-only names.
pub(crate) fn require_name(name: &str, what: &str) -> CapgateResult<()> {
    if name.trim().is_empty() {
        return Err(CapgateError::InvalidArgument(format!(
            "{what} name must not be empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_is_tagged_by_kind() {
        let err = ExecutionError::UnregisteredCapability {
            name: "nonexistent:capability".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "UnregisteredCapability");
        assert_eq!(err.kind(), "UnregisteredCapability");

        let cancelled = serde_json::to_value(ExecutionError::Cancelled).unwrap();
        assert_eq!(cancelled["kind"], "Cancelled");
    }

    #[test]
    fn test_require_name() {
        assert!(require_name("db:query", "capability").is_ok());
        assert_eq!(
            require_name("  ", "context"),
            Err(CapgateError::InvalidArgument(
                "context name must not be empty".into()
            ))
        );
    }
}
