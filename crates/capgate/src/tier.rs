//! Priority tiers controlling eviction order under the cap.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CapgateError;

/// Priority classification of a capability.
///
/// Ordered from least to most important, so `Tier::Low < Tier::Essential`.
/// Eviction walks tiers in ascending order and never touches `Essential`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Evicted first. The default for capabilities without an assignment.
    #[default]
    Low,
    /// Evicted after every `Low` candidate.
    Medium,
    /// Evicted only when no `Low` or `Medium` candidate remains.
    High,
    /// Always active; never evicted and never deactivated.
    Essential,
}

impl Tier {
    /// Every tier, in eviction order.
    pub const ALL: [Tier; 4] = [Tier::Low, Tier::Medium, Tier::High, Tier::Essential];

    /// Whether capabilities of this tier may be evicted.
    #[must_use]
    pub const fn is_evictable(self) -> bool {
        !matches!(self, Self::Essential)
    }

    /// Lowercase label used in configuration and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Essential => "essential",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = CapgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CapgateError::InvalidArgument(format!("unknown tier '{s}'")))
    }
}
