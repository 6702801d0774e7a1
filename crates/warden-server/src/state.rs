//! Application state shared across handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use warden_session::SessionManager;

use crate::config::ServerConfig;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The session lifecycle manager.
    pub sessions: SessionManager,

    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Cancelled when the server stops accepting connections.
    pub shutdown: CancellationToken,

    /// Cancelled when in-flight requests must give up: after the drain
    /// deadline, or once both listeners have stopped. Independent of
    /// `shutdown` so draining requests can finish their writes.
    pub abort: CancellationToken,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        sessions: SessionManager,
        config: ServerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions,
            config: Arc::new(config),
            shutdown,
            abort: CancellationToken::new(),
        }
    }

    /// Token for one request. Survives `shutdown`; cancelled with `abort`.
    pub fn request_token(&self) -> CancellationToken {
        self.abort.child_token()
    }
}
