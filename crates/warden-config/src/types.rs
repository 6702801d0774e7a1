//! Configuration types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_session::SessionPolicy;

use crate::{ConfigError, Result};

/// Allowed range for `service.session_ttl_days`.
pub const SESSION_TTL_DAYS_RANGE: std::ops::RangeInclusive<u32> = 1..=30;

/// Allowed range for `service.access_token_ttl_mins`.
pub const ACCESS_TOKEN_TTL_MINS_RANGE: std::ops::RangeInclusive<u32> = 5..=60;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
}

impl WardenConfig {
    /// Create a config with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string. Missing sections and fields take defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Copy with secrets masked, for printing.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.redis.password.is_some() {
            copy.redis.password = Some("********".to_string());
        }
        copy
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` to read variables.
    ///
    /// Recognized: `SERVICE_ENV`, `SERVICE_ADDRESS`, `REDIS_URL`,
    /// `REDIS_PASSWORD`, `SESSION_TTL_DAYS`, `ACCESS_TOKEN_TTL_MINS`,
    /// `HEALTH_ADDRESS`. Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(env) = get("SERVICE_ENV") {
            self.service.env = env.parse()?;
        }
        if let Some(address) = get("SERVICE_ADDRESS") {
            self.server.address = address;
        }
        if let Some(url) = get("REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(password) = get("REDIS_PASSWORD") {
            self.redis.password = Some(password);
        }
        if let Some(days) = get("SESSION_TTL_DAYS") {
            self.service.session_ttl_days = parse_number("SESSION_TTL_DAYS", &days)?;
        }
        if let Some(mins) = get("ACCESS_TOKEN_TTL_MINS") {
            self.service.access_token_ttl_mins = parse_number("ACCESS_TOKEN_TTL_MINS", &mins)?;
        }
        if let Some(address) = get("HEALTH_ADDRESS") {
            self.health.address = address;
        }
        Ok(())
    }

    /// Check ranges and required values.
    pub fn validate(&self) -> Result<()> {
        let service = &self.service;
        if !SESSION_TTL_DAYS_RANGE.contains(&service.session_ttl_days) {
            return Err(ConfigError::invalid(
                "service.session_ttl_days",
                format!("{} is outside 1..=30", service.session_ttl_days),
            ));
        }
        if !ACCESS_TOKEN_TTL_MINS_RANGE.contains(&service.access_token_ttl_mins) {
            return Err(ConfigError::invalid(
                "service.access_token_ttl_mins",
                format!("{} is outside 5..=60", service.access_token_ttl_mins),
            ));
        }
        if service.blacklist_min_ttl_secs == 0 {
            return Err(ConfigError::invalid(
                "service.blacklist_min_ttl_secs",
                "must be at least 1",
            ));
        }
        if self.server.address.trim().is_empty() {
            return Err(ConfigError::invalid("server.address", "is required"));
        }
        if self.health.address.trim().is_empty() {
            return Err(ConfigError::invalid("health.address", "is required"));
        }
        if self.redis.url.trim().is_empty() {
            return Err(ConfigError::invalid("redis.url", "is required"));
        }
        Ok(())
    }

    /// Session lifecycle policy derived from the `[service]` and `[redis]` sections.
    pub fn session_policy(&self) -> SessionPolicy {
        let policy = SessionPolicy::new()
            .with_session_ttl(self.service.session_ttl())
            .with_blacklist_min_ttl(Duration::from_secs(self.service.blacklist_min_ttl_secs))
            .with_key_prefix(self.redis.key_prefix.clone());

        match self.service.backend_timeout_ms {
            0 => policy.without_backend_timeout(),
            ms => policy.with_backend_timeout(Duration::from_millis(ms)),
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("'{value}' is not a number")))
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::invalid(
                "service.env",
                format!("'{other}' is not one of dev, prod, test"),
            )),
        }
    }
}

/// Session lifetimes and backend behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Deployment environment.
    pub env: Environment,
    /// Default refresh-session lifetime in days.
    pub session_ttl_days: u32,
    /// Access-token lifetime in minutes, reported to clients.
    pub access_token_ttl_mins: u32,
    /// Floor for blacklist TTLs of already-expired sessions.
    pub blacklist_min_ttl_secs: u64,
    /// Per-call backend timeout; 0 disables it.
    pub backend_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            env: Environment::Dev,
            session_ttl_days: 7,
            access_token_ttl_mins: 15,
            blacklist_min_ttl_secs: 60,
            backend_timeout_ms: 5_000,
        }
    }
}

impl ServiceConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.session_ttl_days) * 24 * 60 * 60)
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.access_token_ttl_mins) * 60)
    }
}

/// API listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `127.0.0.1:8080`.
    pub address: String,
    /// How long in-flight requests may run after shutdown begins before
    /// their backend calls are cancelled.
    pub drain_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            drain_timeout_ms: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Redis connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// `host:port`, or a full `redis://` URL.
    pub url: String,
    /// Password injected into the connection URL when set.
    pub password: Option<String>,
    /// Prefix applied to every key.
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:6379".to_string(),
            password: None,
            key_prefix: String::new(),
        }
    }
}

impl RedisConfig {
    /// Full connection URL: adds the `redis://` scheme when missing and
    /// injects the password when one is configured.
    pub fn connection_url(&self) -> String {
        let (scheme, rest) = match self.url.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("redis", self.url.as_str()),
        };

        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("{scheme}://:{password}@{rest}"),
            None => format!("{scheme}://{rest}"),
        }
    }
}

/// Health probe listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Socket address to bind.
    pub address: String,
    /// Name reported by `/health` and `/info`.
    pub service_name: String,
    /// Bound on each health check.
    pub timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8081".to_string(),
            service_name: "warden".to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit console logs as JSON.
    pub json: bool,
    /// Directory for rolling JSON log files. Disabled when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}
