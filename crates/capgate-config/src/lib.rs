#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered configuration for the capgate capability manager.
//!
//! # Usage
//!
//! ```rust,no_run
//! use capgate_config::Config;
//!
//! let loaded = Config::load(None).unwrap();
//! println!("cap = {}", loaded.config.activation.cap);
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`CAPGATE_CAP`, `CAPGATE_TIMEOUT_SECS`, `CAPGATE_LOG_LEVEL`)
//! 2. **Explicit file** passed by the caller
//! 3. **User** (`~/.capgate/config.toml` or `$CAPGATE_HOME/config.toml`)
//! 4. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependency on other capgate crates. Conversion into
//! runtime types happens in `capgate::bootstrap`.

/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::LoadedConfig;
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any layer is malformed or the final
    /// configuration fails validation.
    pub fn load(explicit: Option<&std::path::Path>) -> ConfigResult<LoadedConfig> {
        loader::load(explicit, None)
    }

    /// Load configuration from a single file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// Parse configuration from a TOML string on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the string cannot be parsed or fails
    /// validation.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        loader::load_str(content)
    }
}
