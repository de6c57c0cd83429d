//! Unified error handling for slrelay.
//!
//! Configuration errors live next to the config types; this module holds
//! the errors raised while accepting and serving client connections.
//! Nothing here is ever shown to a client: relay replies are plain status
//! frames produced by the dispatcher.

use crate::state::SessionId;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

// ============================================================================
// Registry Errors
// ============================================================================

/// Session registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("session already registered: {0}")]
    DuplicateSession(SessionId),
}

// ============================================================================
// Connection Errors
// ============================================================================

/// Errors that end a single connection before its receive loop starts.
///
/// Read and write failures inside the loop are not errors at this level:
/// they end the loop and the session is scrubbed like any other disconnect.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tungstenite::Error),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl ConnectionError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "handshake",
            Self::Registry(RegistryError::DuplicateSession(_)) => "duplicate_session",
        }
    }
}
