//! Event types published by the activation manager and dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Correlation ID for tracing related events.
    pub correlation_id: Option<Uuid>,
    /// Component that generated the event.
    pub source: String,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id: None,
            source: source.into(),
        }
    }

    /// Set correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Why a capability entered the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationCause {
    /// Pulled in by an active context group.
    Context,
    /// Activated explicitly by a caller.
    Manual,
    /// Activated by the dispatcher on first use.
    AutoActivated,
    /// Always-on essential capability.
    Essential,
}

/// All events emitted by capgate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivationEvent {
    // ========== Registry ==========
    /// A capability descriptor was registered (or overwritten).
    CapabilityRegistered {
        /// Event metadata.
        metadata: EventMetadata,
        /// Capability name.
        capability: String,
        /// Tier label (`essential`, `high`, `medium`, `low`).
        tier: String,
        /// Whether an existing descriptor was replaced.
        replaced: bool,
    },

    /// A capability descriptor was removed.
    CapabilityDeregistered {
        /// Event metadata.
        metadata: EventMetadata,
        /// Capability name.
        capability: String,
    },

    // ========== Active Set ==========
    /// A capability entered the active set.
    Activated {
        /// Event metadata.
        metadata: EventMetadata,
        /// Capability name.
        capability: String,
        /// What caused the activation.
        cause: ActivationCause,
    },

    /// A capability was explicitly deactivated.
    Deactivated {
        /// Event metadata.
        metadata: EventMetadata,
        /// Capability name.
        capability: String,
    },

    /// Capabilities were evicted to respect the cap.
    Evicted {
        /// Event metadata.
        metadata: EventMetadata,
        /// Evicted names, in eviction order.
        capabilities: Vec<String>,
        /// The cap that was enforced.
        cap: usize,
    },

    /// Essentials alone exceed the cap; the active set is over budget.
    BudgetExceeded {
        /// Event metadata.
        metadata: EventMetadata,
        /// The configured cap.
        cap: usize,
        /// Size of the active set after eviction.
        active: usize,
    },

    // ========== Contexts ==========
    /// The active context set changed.
    ContextsChanged {
        /// Event metadata.
        metadata: EventMetadata,
        /// Active contexts after the change.
        contexts: Vec<String>,
        /// Whether the change belongs to a scoped widening.
        scoped: bool,
    },

    // ========== Dispatch ==========
    /// The dispatcher finished executing a capability.
    ExecutionFinished {
        /// Event metadata.
        metadata: EventMetadata,
        /// Capability name.
        capability: String,
        /// Whether the execution succeeded.
        success: bool,
        /// Error kind label when it failed.
        error_kind: Option<String>,
        /// Wall-clock duration in milliseconds.
        duration_ms: u64,
    },
}

impl ActivationEvent {
    /// Get the event type as a string.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CapabilityRegistered { .. } => "capability_registered",
            Self::CapabilityDeregistered { .. } => "capability_deregistered",
            Self::Activated { .. } => "activated",
            Self::Deactivated { .. } => "deactivated",
            Self::Evicted { .. } => "evicted",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::ContextsChanged { .. } => "contexts_changed",
            Self::ExecutionFinished { .. } => "execution_finished",
        }
    }

    /// Get the event metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::CapabilityRegistered { metadata, .. }
            | Self::CapabilityDeregistered { metadata, .. }
            | Self::Activated { metadata, .. }
            | Self::Deactivated { metadata, .. }
            | Self::Evicted { metadata, .. }
            | Self::BudgetExceeded { metadata, .. }
            | Self::ContextsChanged { metadata, .. }
            | Self::ExecutionFinished { metadata, .. } => metadata,
        }
    }

    /// Whether this event concerns the named capability.
    #[must_use]
    pub fn concerns(&self, name: &str) -> bool {
        match self {
            Self::CapabilityRegistered { capability, .. }
            | Self::CapabilityDeregistered { capability, .. }
            | Self::Activated { capability, .. }
            | Self::Deactivated { capability, .. }
            | Self::ExecutionFinished { capability, .. } => capability == name,
            Self::Evicted { capabilities, .. } => capabilities.iter().any(|c| c == name),
            Self::BudgetExceeded { .. } | Self::ContextsChanged { .. } => false,
        }
    }
}
