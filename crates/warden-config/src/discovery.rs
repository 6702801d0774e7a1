//! Config file discovery.
//!
//! The first match wins:
//! 1. An explicit path (the `--config` flag)
//! 2. `WARDEN_CONFIG`
//! 3. `./warden.toml` (project-local)
//! 4. `~/.config/warden/config.toml` (XDG user config)
//!
//! If nothing is found the defaults are used. Environment overrides are
//! applied on top in every case.

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, WardenConfig};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "warden.toml";

/// Default config filename within XDG config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "warden";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "WARDEN_CONFIG";

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The effective configuration, env overrides applied.
    pub config: WardenConfig,
    /// The file it was read from, if any.
    pub source: Option<PathBuf>,
}

/// Discover, load, override from the process environment, and validate.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(path, None, None, |key| std::env::var(key).ok())
}

/// Load configuration with explicit control over every input.
///
/// `project_dir` replaces the working directory when looking for
/// `warden.toml`, `config_dir` replaces the XDG directory, and `env` replaces
/// the process environment.
pub fn load_config_with_options<F>(
    path: Option<&Path>,
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
    env: F,
) -> Result<LoadedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let source = match path {
        Some(path) => Some(path.to_path_buf()),
        None => env(CONFIG_PATH_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| discover(project_dir, config_dir)),
    };

    let mut config = match &source {
        Some(path) => load_config_file(path)?,
        None => WardenConfig::new(),
    };

    config.apply_env_with(&env)?;
    config.validate()?;

    Ok(LoadedConfig { config, source })
}

/// Load config from a specific file path (no discovery, no overrides).
pub fn load_config_file(path: &Path) -> Result<WardenConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    WardenConfig::from_toml(&contents)
}

/// Get the XDG config file path for warden.
pub fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME).join(USER_CONFIG_FILE))
}

/// First existing file among the implicit locations.
fn discover(project_dir: Option<&Path>, config_dir: Option<&Path>) -> Option<PathBuf> {
    let project = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    let user = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };

    std::iter::once(project)
        .chain(user)
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment;
    use std::fs;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_xdg_config_path_shape() {
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with("warden/config.toml"));
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/warden.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_no_files_yields_defaults() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();

        let loaded =
            load_config_with_options(None, Some(project.path()), Some(user.path()), no_env)
                .unwrap();
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config, WardenConfig::default());
    }

    #[test]
    fn test_project_file_beats_user_file() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            project.path().join("warden.toml"),
            "[server]\naddress = \"0.0.0.0:7000\"\n",
        )
        .unwrap();
        fs::write(
            user.path().join("config.toml"),
            "[server]\naddress = \"0.0.0.0:7001\"\n",
        )
        .unwrap();

        let loaded =
            load_config_with_options(None, Some(project.path()), Some(user.path()), no_env)
                .unwrap();
        assert_eq!(loaded.config.server.address, "0.0.0.0:7000");
        assert!(loaded.source.unwrap().ends_with("warden.toml"));
    }

    #[test]
    fn test_user_file_used_when_no_project_file() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            "[service]\nenv = \"prod\"\n",
        )
        .unwrap();

        let loaded =
            load_config_with_options(None, Some(project.path()), Some(user.path()), no_env)
                .unwrap();
        assert_eq!(loaded.config.service.env, Environment::Prod);
    }

    #[test]
    fn test_env_path_and_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[service]\nsession_ttl_days = 10\n").unwrap();
        let path_str = path.display().to_string();

        let loaded = load_config_with_options(None, Some(dir.path()), Some(dir.path()), |key| {
            match key {
                CONFIG_PATH_ENV => Some(path_str.clone()),
                "ACCESS_TOKEN_TTL_MINS" => Some("45".to_string()),
                _ => None,
            }
        })
        .unwrap();

        assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.service.session_ttl_days, 10);
        assert_eq!(loaded.config.service.access_token_ttl_mins, 45);
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");

        let err = load_config_with_options(Some(&missing), None, None, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.toml");
        fs::write(&path, "[service]\naccess_token_ttl_mins = 90\n").unwrap();

        let err = load_config_with_options(Some(&path), None, None, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
