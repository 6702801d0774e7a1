//! CLI command handlers.

pub mod check_config;
pub mod serve;

use std::path::PathBuf;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, if given.
    pub config_path: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Use the in-process backend.
    pub memory: bool,
    /// Force JSON console logs.
    pub json_logs: bool,
}
