//! Config file discovery and layered loading.
//!
//! `load()` resolves, lowest to highest precedence:
//! 1. Embedded `defaults.toml`
//! 2. User config (`~/.capgate/config.toml`, or `CAPGATE_HOME/config.toml`)
//! 3. An explicit config file, if given
//! 4. `CAPGATE_*` environment overrides
//!
//! Layers are deep-merged as TOML tables, then deserialized and validated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// Environment variable overriding `activation.cap`.
pub const ENV_CAP: &str = "CAPGATE_CAP";
/// Environment variable overriding `dispatch.timeout_secs`.
pub const ENV_TIMEOUT_SECS: &str = "CAPGATE_TIMEOUT_SECS";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "CAPGATE_LOG_LEVEL";
/// Environment variable naming an alternate config home directory.
pub const ENV_HOME: &str = "CAPGATE_HOME";

/// A fully loaded configuration plus the files it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged, validated configuration.
    pub config: Config,
    /// Files merged on top of the embedded defaults, in order.
    pub loaded_files: Vec<PathBuf>,
}

/// Load the layered configuration.
///
/// `explicit` is a config file that must exist. `home_override` replaces
/// the user config directory (the directory containing `config.toml`).
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is unreadable or malformed, an
/// environment override is not a valid value, or validation fails.
pub fn load(explicit: Option<&Path>, home_override: Option<&Path>) -> ConfigResult<LoadedConfig> {
    let env: HashMap<String, String> = std::env::vars()
        .filter(|(k, _)| k.starts_with("CAPGATE_"))
        .collect();
    load_with_env(explicit, home_override, &env)
}

/// [`load`] with an explicit environment map.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env(
    explicit: Option<&Path>,
    home_override: Option<&Path>,
    env: &HashMap<String, String>,
) -> ConfigResult<LoadedConfig> {
    let mut merged = parse_toml(DEFAULTS_TOML, "<embedded defaults>")?;
    let mut loaded_files = Vec::new();

    let user_dir = match (home_override, env.get(ENV_HOME)) {
        (Some(dir), _) => Some(dir.to_path_buf()),
        (None, Some(dir)) => Some(PathBuf::from(dir)),
        (None, None) => home_directory().ok().map(|h| h.join(".capgate")),
    };

    if let Some(dir) = user_dir {
        let user_path = dir.join("config.toml");
        if let Some(overlay) = try_load_file(&user_path)? {
            deep_merge(&mut merged, overlay);
            info!(path = %user_path.display(), "loaded user config");
            loaded_files.push(user_path);
        }
    }

    if let Some(path) = explicit {
        let overlay = read_file(path)?;
        deep_merge(&mut merged, overlay);
        info!(path = %path.display(), "loaded config file");
        loaded_files.push(path.to_path_buf());
    }

    let applied = apply_env_overrides(&mut merged, env)?;
    if applied > 0 {
        debug!(count = applied, "applied environment overrides");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(LoadedConfig {
        config,
        loaded_files,
    })
}

/// Load a config from a single file on top of the embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let overlay = read_file(path)?;
    from_overlay(overlay)
}

/// Parse a config from a TOML string on top of the embedded defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the string cannot be parsed or validated.
pub fn load_str(content: &str) -> ConfigResult<Config> {
    let overlay = parse_toml(content, "<string>")?;
    from_overlay(overlay)
}

fn from_overlay(overlay: toml::Value) -> ConfigResult<Config> {
    let mut merged = parse_toml(DEFAULTS_TOML, "<embedded defaults>")?;
    deep_merge(&mut merged, overlay);
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Merge `overlay` into `base`. Tables merge key by key; any other value
/// (including arrays) replaces the base value.
fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_table.insert(key, value);
                    },
                }
            }
        },
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(
    merged: &mut toml::Value,
    env: &HashMap<String, String>,
) -> ConfigResult<usize> {
    let mut applied = 0usize;

    if let Some(raw) = env.get(ENV_CAP) {
        let cap = parse_integer(ENV_CAP, raw)?;
        set_path(merged, &["activation", "cap"], toml::Value::Integer(cap));
        applied = applied.saturating_add(1);
    }

    if let Some(raw) = env.get(ENV_TIMEOUT_SECS) {
        let secs = parse_integer(ENV_TIMEOUT_SECS, raw)?;
        set_path(merged, &["dispatch", "timeout_secs"], toml::Value::Integer(secs));
        applied = applied.saturating_add(1);
    }

    if let Some(level) = env.get(ENV_LOG_LEVEL) {
        set_path(
            merged,
            &["logging", "level"],
            toml::Value::String(level.clone()),
        );
        applied = applied.saturating_add(1);
    }

    Ok(applied)
}

fn parse_integer(var_name: &str, raw: &str) -> ConfigResult<i64> {
    raw.trim()
        .parse::<u32>()
        .map(i64::from)
        .map_err(|e| ConfigError::EnvError {
            var_name: var_name.to_owned(),
            message: format!("expected a non-negative integer: {e}"),
        })
}

fn set_path(root: &mut toml::Value, path: &[&str], value: toml::Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = root;
    for key in parents {
        let toml::Value::Table(table) = node else {
            return;
        };
        node = table
            .entry((*key).to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    if let toml::Value::Table(table) = node {
        table.insert((*last).to_owned(), value);
    }
}

fn parse_toml(content: &str, origin: &str) -> ConfigResult<toml::Value> {
    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: origin.to_owned(),
            message: format!(
                "config is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: origin.to_owned(),
        source: e,
    })
}

fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_toml(&content, &path.display().to_string())
}

/// Read a file, returning `None` if it does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    match read_file(path) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::ReadError { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!(path = %path.display(), "config file not found, skipping");
            Ok(None)
        },
        Err(e) => Err(e),
    }
}

fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}
