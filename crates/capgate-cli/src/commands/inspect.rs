//! Inspect command - show the active set for a context combination.

use capgate::{ActivationManager, ActivationStats, Tier};
use capgate_config::Config;
use colored::Colorize;
use serde::Serialize;

use super::prepared_manager;
use crate::theme::Theme;

/// One active capability.
#[derive(Debug, Serialize)]
pub(crate) struct ActiveEntry {
    pub(crate) name: String,
    pub(crate) tier: Tier,
}

/// Everything `inspect` prints.
#[derive(Debug, Serialize)]
pub(crate) struct InspectReport {
    pub(crate) contexts: Vec<String>,
    pub(crate) active: Vec<ActiveEntry>,
    pub(crate) evicted: Vec<String>,
    pub(crate) stats: ActivationStats,
}

impl InspectReport {
    pub(crate) fn from_manager(manager: &ActivationManager) -> Self {
        let stats = manager.stats();
        let mut active: Vec<ActiveEntry> = manager
            .list_active()
            .into_iter()
            .map(|name| ActiveEntry {
                tier: manager.tier(&name),
                name,
            })
            .collect();
        // Most protected first, then by name.
        active.sort_by(|a, b| b.tier.cmp(&a.tier).then_with(|| a.name.cmp(&b.name)));

        Self {
            contexts: stats.active_contexts.clone(),
            active,
            evicted: stats.last_evicted.clone(),
            stats,
        }
    }
}

/// Build the manager and print its active set.
pub(crate) fn run_inspect(
    config: &Config,
    preset: Option<&str>,
    contexts: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let manager = prepared_manager(config, preset, contexts)?;
    let report = InspectReport::from_manager(&manager);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &InspectReport) {
    let stats = &report.stats;

    println!("\n{}", Theme::header("Active Capabilities"));
    if report.contexts.is_empty() {
        println!("  contexts: {}", "(none)".dimmed());
    } else {
        println!("  contexts: {}", report.contexts.join(", "));
    }
    println!("{:>10}  {}", "TIER".dimmed(), "NAME".dimmed());
    println!("{}", Theme::separator());

    for entry in &report.active {
        println!("{:>10}  {}", Theme::tier(entry.tier), entry.name);
    }

    println!("{}", Theme::separator());
    println!(
        "  {} of {} slots used, {} evicted in the last pass",
        stats.active_count,
        stats.cap,
        report.evicted.len()
    );
    for name in &report.evicted {
        println!("    {} {}", "-".red(), name.dimmed());
    }

    if stats.is_over_cap() {
        println!(
            "{}",
            Theme::warning(&format!(
                "Over the cap by {}: essentials alone exceed it",
                stats.over_cap_by
            ))
        );
    }
    println!();
}
