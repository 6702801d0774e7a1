//! Configuration system for the Warden session service.
//!
//! Provides TOML-based configuration with:
//! - `[service]`, `[server]`, `[redis]`, `[health]`, and `[logging]` sections,
//!   every field defaulted
//! - Config file discovery (explicit path, `WARDEN_CONFIG`, project-local,
//!   XDG user config)
//! - Environment variable overrides applied after the file
//! - Range validation and conversion into the core's `SessionPolicy`

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_PATH_ENV, LoadedConfig, load_config, load_config_file, load_config_with_options,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
