//! Policy knobs for the session lifecycle.

use std::time::Duration;

/// Default session lifetime when the caller does not set `expires_at` (7 days).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default floor for blacklist TTLs of already-expired sessions (1 minute).
pub const DEFAULT_BLACKLIST_MIN_TTL: Duration = Duration::from_secs(60);

/// Default bound on a single backend call.
pub const DEFAULT_BACKEND_TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

/// Key naming for the three keyspaces.
///
/// With the default empty prefix the layout is `session:<id>`,
/// `user_sessions:<user>`, and `blacklist:<token>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    /// Layout with every key prefixed by `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn session(&self, id: &str) -> String {
        format!("{}session:{}", self.prefix, id)
    }

    pub fn user_sessions(&self, user_identifier: &str) -> String {
        format!("{}user_sessions:{}", self.prefix, user_identifier)
    }

    pub fn blacklist(&self, token: &str) -> String {
        format!("{}blacklist:{}", self.prefix, token)
    }
}

/// Configuration for the session lifecycle manager.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Lifetime applied when a create request carries no `expires_at`.
    pub session_ttl: Duration,

    /// Minimum TTL for blacklist entries (and revoked-record rewrites)
    /// whose session has already run out.
    pub blacklist_min_ttl: Duration,

    /// Bound on each backend call. `None` waits indefinitely.
    pub backend_timeout: Option<Duration>,

    /// Key naming.
    pub keys: KeyLayout,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            blacklist_min_ttl: DEFAULT_BLACKLIST_MIN_TTL,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            keys: KeyLayout::default(),
        }
    }
}

impl SessionPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default session lifetime.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Set the blacklist TTL floor.
    pub fn with_blacklist_min_ttl(mut self, ttl: Duration) -> Self {
        self.blacklist_min_ttl = ttl;
        self
    }

    /// Set the per-call backend timeout.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = Some(timeout);
        self
    }

    /// Disable the per-call backend timeout.
    pub fn without_backend_timeout(mut self) -> Self {
        self.backend_timeout = None;
        self
    }

    /// Prefix every key.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.keys = KeyLayout::with_prefix(prefix);
        self
    }
}
