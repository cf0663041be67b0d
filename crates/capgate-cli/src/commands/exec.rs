//! Exec command - run a capability through the dispatcher.

use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::Value;

use super::prepared_manager;
use crate::theme::Theme;

/// Execute `name` under the configured dispatcher and print the result.
///
/// Capabilities named in the configuration are registered without a
/// handler, so this reports the stub result plus activation side effects.
pub(crate) async fn run_exec(
    config: &capgate_config::Config,
    name: &str,
    params: &str,
    contexts: &[String],
) -> anyhow::Result<()> {
    let params: Value = serde_json::from_str(params).context("--params must be valid JSON")?;

    let manager = Arc::new(prepared_manager(config, None, contexts)?);
    register_known(&manager)?;
    let dispatcher = capgate::dispatcher_from_config(Arc::clone(&manager), config);

    let result = dispatcher.execute(name, params).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.success {
        let mut notes = Vec::new();
        if result.metadata.auto_activated {
            notes.push("auto-activated");
        }
        if result.metadata.stub {
            notes.push("stub");
        }
        let suffix = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };
        println!(
            "{}",
            Theme::success(&format!("{name} finished in {}ms{suffix}", result.metadata.duration_ms))
        );
        let evicted = manager.stats().last_evicted;
        if result.metadata.auto_activated && !evicted.is_empty() {
            println!("  {} {}", "evicted:".dimmed(), evicted.join(", "));
        }
    } else if let Some(error) = &result.error {
        println!("{}", Theme::error(&format!("{name}: {error}")));
    }

    Ok(())
}

/// Register every context member so it can be executed.
fn register_known(manager: &capgate::ActivationManager) -> anyhow::Result<()> {
    for context in manager.context_names() {
        let Some(group) = manager.context_group(&context) else {
            continue;
        };
        for member in group.members() {
            if !manager.is_registered(member) {
                manager.register(capgate::CapabilityDescriptor::new(member.as_str()))?;
            }
        }
    }
    Ok(())
}
