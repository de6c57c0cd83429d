//! WebSocket upgrade policy.
//!
//! Checked during the HTTP upgrade, before a session exists. Requests for
//! any path other than the configured one get 404; when an origin allow-list
//! is configured, requests from other origins (or with no Origin header)
//! get 403.

use crate::config::ListenConfig;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::warn;

/// Path and origin rules applied to every upgrade request.
#[derive(Debug, Clone)]
pub struct UpgradePolicy {
    path: String,
    allow_origins: Vec<String>,
}

impl UpgradePolicy {
    pub fn new(path: impl Into<String>, allow_origins: Vec<String>) -> Self {
        Self {
            path: path.into(),
            allow_origins,
        }
    }

    pub fn from_config(listen: &ListenConfig) -> Self {
        Self::new(listen.path.clone(), listen.allow_origins.clone())
    }

    /// Accept or reject an upgrade request.
    pub fn check(&self, req: &Request) -> Result<(), ErrorResponse> {
        if req.uri().path() != self.path {
            return Err(reject(StatusCode::NOT_FOUND, "Not found"));
        }

        // Empty allow-list accepts every origin.
        if self.allow_origins.is_empty() {
            return Ok(());
        }

        let origin = req.headers().get("Origin").and_then(|o| o.to_str().ok());
        match origin {
            Some(origin) if self.allow_origins.iter().any(|a| a == origin || a == "*") => Ok(()),
            _ => {
                warn!(origin = ?origin, "WebSocket origin rejected");
                Err(reject(StatusCode::FORBIDDEN, "Origin not allowed"))
            }
        }
    }
}

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}
