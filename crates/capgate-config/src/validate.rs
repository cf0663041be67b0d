//! Post-merge configuration validation.
//!
//! Validates that deserialized [`Config`](crate::Config) values are within
//! acceptable ranges and that cross-references between sections resolve.

use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, TIER_LABELS};

/// Upper bound on the active-set cap.
const MAX_CAP: usize = 10_000;

/// Upper bound on the default handler timeout (one hour).
const MAX_TIMEOUT_SECS: u64 = 3_600;

/// Upper bound on cache time-to-live (one day).
const MAX_CACHE_TTL_SECS: u64 = 86_400;

/// Validate a fully merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_activation(config)?;
    validate_contexts(config)?;
    validate_priorities(config)?;
    validate_dispatch(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate_activation(config: &Config) -> ConfigResult<()> {
    let a = &config.activation;

    if a.cap == 0 || a.cap > MAX_CAP {
        return Err(invalid(
            "activation.cap",
            format!("cap must be between 1 and {MAX_CAP}"),
        ));
    }

    if a.event_capacity == 0 {
        return Err(invalid(
            "activation.event_capacity",
            "event_capacity must be at least 1",
        ));
    }

    if a.essentials.iter().any(|n| n.trim().is_empty()) {
        return Err(invalid(
            "activation.essentials",
            "essential capability names must not be empty",
        ));
    }

    let essentials = config.essential_names().len();
    if essentials > a.cap {
        // Essentials are never evicted; the manager will run over the cap.
        warn!(
            essentials,
            cap = a.cap,
            "essential capabilities exceed the configured cap"
        );
    }

    Ok(())
}

fn validate_contexts(config: &Config) -> ConfigResult<()> {
    for (name, members) in &config.contexts {
        if name.trim().is_empty() {
            return Err(invalid("contexts", "context names must not be empty"));
        }
        if members.iter().any(|m| m.trim().is_empty()) {
            return Err(invalid(
                format!("contexts.{name}"),
                "member capability names must not be empty",
            ));
        }
    }

    for (preset, contexts) in &config.presets {
        if let Some(unknown) = contexts.iter().find(|c| !config.contexts.contains_key(*c)) {
            return Err(invalid(
                format!("presets.{preset}"),
                format!("references unknown context '{unknown}'"),
            ));
        }
    }

    Ok(())
}

fn validate_priorities(config: &Config) -> ConfigResult<()> {
    for (name, tier) in &config.priorities {
        if name.trim().is_empty() {
            return Err(invalid("priorities", "capability names must not be empty"));
        }
        if !TIER_LABELS.iter().any(|t| t.eq_ignore_ascii_case(tier)) {
            return Err(invalid(
                format!("priorities.{name}"),
                format!(
                    "unknown tier '{tier}'; expected one of: {}",
                    TIER_LABELS.join(", ")
                ),
            ));
        }
    }
    Ok(())
}

fn validate_dispatch(config: &Config) -> ConfigResult<()> {
    let d = &config.dispatch;

    if d.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(invalid(
            "dispatch.timeout_secs",
            format!("timeout_secs must not exceed {MAX_TIMEOUT_SECS}"),
        ));
    }

    if d.cache_ttl_secs == 0 && !d.cacheable.is_empty() {
        return Err(invalid(
            "dispatch.cache_ttl_secs",
            "cache_ttl_secs must be positive when cacheable capabilities are listed",
        ));
    }

    if d.cache_ttl_secs > MAX_CACHE_TTL_SECS {
        return Err(invalid(
            "dispatch.cache_ttl_secs",
            format!("cache_ttl_secs must not exceed {MAX_CACHE_TTL_SECS}"),
        ));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !matches!(
        l.level.to_ascii_lowercase().as_str(),
        "error" | "warn" | "info" | "debug" | "trace" | "off"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported level '{}'; expected one of: error, warn, info, debug, trace, off",
                l.level
            ),
        ));
    }

    if !matches!(
        l.format.to_ascii_lowercase().as_str(),
        "pretty" | "compact" | "json" | "full"
    ) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }

    Ok(())
}
