//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use warden_config::WardenConfig;

use crate::error::{Result, ServerError};

/// Default bound on each health check (5 seconds).
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default grace period for in-flight requests after shutdown (10 seconds).
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address for the session API.
    pub bind_address: SocketAddr,

    /// Address for the health probe listener.
    pub health_address: SocketAddr,

    /// Service name reported by the health probe.
    pub service_name: String,

    /// Bound on each health check.
    pub health_timeout: Duration,

    /// How long in-flight requests keep their backend calls after shutdown
    /// begins. Past this, their tokens are cancelled.
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            health_address: SocketAddr::from(([127, 0, 0, 1], 8081)),
            service_name: "warden".to_string(),
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the loaded service configuration.
    pub fn from_config(config: &WardenConfig) -> Result<Self> {
        Ok(Self {
            bind_address: parse_address("server.address", &config.server.address)?,
            health_address: parse_address("health.address", &config.health.address)?,
            service_name: config.health.service_name.clone(),
            health_timeout: config.health.timeout(),
            drain_timeout: config.server.drain_timeout(),
        })
    }

    /// Set the API bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set the health probe bind address.
    pub fn with_health_address(mut self, addr: SocketAddr) -> Self {
        self.health_address = addr;
        self
    }

    /// Set the reported service name.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the health check timeout.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Set the shutdown grace period for in-flight requests.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

fn parse_address(field: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| ServerError::Config(format!("{field} '{value}': {e}")))
}
