//! Configuration types for capgate.
//!
//! These types carry no dependency on the runtime crate. Tiers are plain
//! strings here and are parsed at the bootstrap boundary. Every struct
//! implements [`Default`] so that a bare `[section]` header in TOML yields a
//! working configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Accepted tier labels, highest priority first.
pub const TIER_LABELS: &[&str] = &["essential", "high", "medium", "low"];

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cap and always-on capabilities.
    pub activation: ActivationSection,
    /// Context groups: context name to member capability names.
    pub contexts: BTreeMap<String, Vec<String>>,
    /// Presets: preset name to the context names it turns on.
    pub presets: BTreeMap<String, Vec<String>>,
    /// Tier assignments: capability name to tier label.
    pub priorities: BTreeMap<String, String>,
    /// Dispatcher timeouts and result caching.
    pub dispatch: DispatchSection,
    /// Logging level, format and per-module directives.
    pub logging: LoggingSection,
}

/// Active-set sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationSection {
    /// Maximum number of simultaneously active capabilities.
    pub cap: usize,
    /// Capabilities that are always active and never evicted.
    pub essentials: Vec<String>,
    /// Buffer size of the activation event bus.
    pub event_capacity: usize,
}

impl Default for ActivationSection {
    fn default() -> Self {
        Self {
            cap: 50,
            essentials: Vec::new(),
            event_capacity: 1024,
        }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// Default handler timeout in seconds. `0` disables the timeout.
    pub timeout_secs: u64,
    /// Time-to-live of cached results in seconds.
    pub cache_ttl_secs: u64,
    /// Capabilities whose successful results are memoized.
    pub cacheable: Vec<String>,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            cache_ttl_secs: 300,
            cacheable: Vec::new(),
        }
    }
}

/// Logging settings consumed by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Level filter (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Output format (`pretty`, `compact`, `json`, `full`).
    pub format: String,
    /// Extra `EnvFilter` directives.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

impl Config {
    /// Capabilities assigned the `essential` tier, from both the
    /// `activation.essentials` list and the `priorities` table.
    #[must_use]
    pub fn essential_names(&self) -> Vec<String> {
        let mut names = self.activation.essentials.clone();
        for (name, tier) in &self.priorities {
            if tier.eq_ignore_ascii_case("essential") && !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_sections_use_defaults() {
        let config: Config = toml::from_str("[activation]\n[dispatch]\n").unwrap();
        assert_eq!(config.activation.cap, 50);
        assert_eq!(config.dispatch.timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [activation]
            cap = 12
            essentials = ["sequential_analyze"]

            [contexts]
            documentation = ["docs:search", "docs:fetch"]

            [presets]
            writer = ["documentation"]

            [priorities]
            "docs:search" = "high"
            "memory:recall" = "essential"
        "#,
        )
        .unwrap();

        assert_eq!(config.activation.cap, 12);
        assert_eq!(config.contexts["documentation"].len(), 2);
        assert_eq!(config.presets["writer"], vec!["documentation"]);
        assert_eq!(
            config.essential_names(),
            vec!["sequential_analyze".to_owned(), "memory:recall".to_owned()]
        );
    }
}
