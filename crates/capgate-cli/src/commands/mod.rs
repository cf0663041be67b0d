//! CLI subcommands.

pub(crate) mod check;
pub(crate) mod exec;
pub(crate) mod inspect;

use capgate::ActivationManager;
use capgate_config::Config;
use tracing::debug;

use crate::theme::Theme;

/// Build a manager from `config`, apply `preset` if given, then add
/// `contexts` to whatever is active.
///
/// Context names the configuration does not define are reported and
/// otherwise ignored.
pub(crate) fn prepared_manager(
    config: &Config,
    preset: Option<&str>,
    contexts: &[String],
) -> anyhow::Result<ActivationManager> {
    let manager = capgate::manager_from_config(config)?;

    if let Some(preset) = preset {
        manager.apply_preset(preset)?;
    }

    if !contexts.is_empty() {
        let known = manager.context_names();
        for name in contexts.iter().filter(|c| !known.contains(c)) {
            eprintln!("{}", Theme::warning(&format!("Unknown context '{name}' ignored")));
        }
        let mut active = manager.active_contexts();
        active.extend(contexts.iter().cloned());
        manager.set_active_contexts(active)?;
    }

    debug!(?preset, ?contexts, active = manager.list_active().len(), "Manager prepared");
    Ok(manager)
}
