//! Build runtime objects from a loaded [`Config`].

use std::sync::Arc;
use std::time::Duration;

use capgate_config::Config;
use capgate_events::EventBus;
use tracing::debug;

use crate::cache::ResultCache;
use crate::dispatch::Dispatcher;
use crate::error::{CapgateError, CapgateResult};
use crate::manager::ActivationManager;
use crate::tier::Tier;

/// Build an [`ActivationManager`] with the configured cap, essentials,
/// tiers, context groups and presets. No context is active afterwards.
///
/// # Errors
///
/// Returns [`CapgateError::Config`] if a tier label does not parse, or
/// [`CapgateError::InvalidArgument`] for empty names.
pub fn manager_from_config(config: &Config) -> CapgateResult<ActivationManager> {
    let manager = ActivationManager::builder()
        .cap(config.activation.cap)
        .essentials(config.essential_names())
        .event_bus(EventBus::with_capacity(config.activation.event_capacity))
        .build()?;

    for (name, label) in &config.priorities {
        let tier: Tier = label
            .parse()
            .map_err(|_| CapgateError::Config(format!("priorities.{name}: unknown tier '{label}'")))?;
        manager.set_priority(name, tier)?;
    }

    for (name, members) in &config.contexts {
        manager.add_context_group(name, members.iter().map(String::as_str))?;
    }

    for (name, contexts) in &config.presets {
        manager.add_preset(name, contexts.iter().map(String::as_str))?;
    }

    debug!(
        contexts = config.contexts.len(),
        presets = config.presets.len(),
        priorities = config.priorities.len(),
        "Manager built from configuration"
    );
    Ok(manager)
}

/// Build a [`Dispatcher`] with the configured timeout and cacheable
/// capabilities. A timeout of zero disables the default timeout.
#[must_use]
pub fn dispatcher_from_config(manager: Arc<ActivationManager>, config: &Config) -> Dispatcher {
    let dispatch = &config.dispatch;
    let mut dispatcher = Dispatcher::new(manager);

    if dispatch.timeout_secs > 0 {
        dispatcher = dispatcher.with_default_timeout(Duration::from_secs(dispatch.timeout_secs));
    }

    if !dispatch.cacheable.is_empty() {
        let ttl = Duration::from_secs(dispatch.cache_ttl_secs);
        dispatcher = dispatcher.with_cache(Arc::new(ResultCache::new()));
        for name in &dispatch.cacheable {
            dispatcher = dispatcher.cacheable(name.as_str(), ttl);
        }
    }

    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONFIG: &str = r#"
        [activation]
        cap = 4
        essentials = ["sequential_analyze"]

        [contexts]
        documentation = ["docs:search", "web:fetch"]
        kanban = ["board:list", "board:move", "board:archive"]

        [presets]
        writer = ["documentation", "kanban"]

        [priorities]
        "board:archive" = "low"
        "docs:search" = "high"
        "memory:recall" = "essential"

        [dispatch]
        timeout_secs = 0
        cache_ttl_secs = 60
        cacheable = ["docs:search"]
    "#;

    #[test]
    fn test_manager_from_config() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let manager = manager_from_config(&config).unwrap();

        assert_eq!(manager.cap(), 4);
        assert_eq!(
            manager.list_active(),
            vec!["memory:recall", "sequential_analyze"]
        );
        assert_eq!(manager.tier("docs:search"), Tier::High);
        assert_eq!(manager.presets(), vec!["writer"]);

        manager.apply_preset("writer").unwrap();
        let active = manager.list_active();
        assert_eq!(active.len(), 4);
        assert!(active.contains(&"docs:search".to_owned()));
        assert!(!active.contains(&"board:archive".to_owned()));
    }

    #[test]
    fn test_bad_tier_is_config_error() {
        let mut config = Config::default();
        config
            .priorities
            .insert("db:query".to_owned(), "urgent".to_owned());
        assert!(matches!(
            manager_from_config(&config),
            Err(CapgateError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatcher_from_config() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let manager = Arc::new(manager_from_config(&config).unwrap());
        let dispatcher = dispatcher_from_config(Arc::clone(&manager), &config);
        assert!(dispatcher.cache().is_some());

        let result = dispatcher.execute("docs:search", json!({})).await;
        assert!(result.success, "{result:?}");
        assert!(result.metadata.stub);
    }
}
