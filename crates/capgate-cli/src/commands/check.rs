//! Check command - validate and summarize the configuration.

use capgate_config::LoadedConfig;
use colored::Colorize;

use crate::theme::Theme;

/// Summarize a configuration that loaded and validated.
pub(crate) fn run_check(loaded: &LoadedConfig) -> anyhow::Result<()> {
    let config = &loaded.config;

    println!("\n{}", Theme::header("Configuration"));
    if loaded.loaded_files.is_empty() {
        println!("  {}", "Using built-in defaults".dimmed());
    }
    for path in &loaded.loaded_files {
        println!("  {} {}", "file".dimmed(), path.display());
    }
    println!("{}", Theme::separator());

    // Building the manager is the real check: tier labels and names must
    // convert into runtime types.
    let manager = capgate::manager_from_config(config)?;
    let stats = manager.stats();

    println!("  cap:          {}", stats.cap);
    println!("  essentials:   {}", stats.essential_count);
    println!("  contexts:     {}", stats.context_count);
    println!("  presets:      {}", manager.presets().len());
    println!(
        "  timeout:      {}",
        if config.dispatch.timeout_secs == 0 {
            "none".to_owned()
        } else {
            format!("{}s", config.dispatch.timeout_secs)
        }
    );
    println!(
        "  cacheable:    {} (ttl {}s)",
        config.dispatch.cacheable.len(),
        config.dispatch.cache_ttl_secs
    );
    println!();

    if stats.is_over_cap() {
        println!(
            "{}",
            Theme::warning(&format!(
                "Essential capabilities exceed the cap by {}",
                stats.over_cap_by
            ))
        );
    }

    for context in manager.context_names() {
        let size = manager
            .context_group(&context)
            .map_or(0, |group| group.len());
        if size > stats.headroom() {
            println!(
                "{}",
                Theme::info(&format!(
                    "Context '{context}' has {size} members but only {} slots remain after essentials",
                    stats.headroom()
                ))
            );
        }
    }

    println!("{}", Theme::success("Configuration is valid"));
    Ok(())
}
