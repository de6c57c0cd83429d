//! Network listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080").
    pub address: SocketAddr,
    /// Request path accepted for the WebSocket upgrade. Other paths get 404.
    #[serde(default = "default_path")]
    pub path: String,
    /// Allowed origins (e.g., `["https://example.com"]`).
    /// Empty list allows all origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

fn default_path() -> String {
    "/".to_string()
}

/// TLS listener configuration.
///
/// The TLS listener serves the same upgrade path and origin policy as the
/// plaintext one.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Address to bind to for TLS (e.g., "0.0.0.0:8443").
    pub address: SocketAddr,
    /// Path to certificate file (PEM format).
    pub cert_path: String,
    /// Path to private key file (PEM format, PKCS#8).
    pub key_path: String,
}
