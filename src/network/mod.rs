//! Network module.
//!
//! Contains the Gateway (TCP/TLS listener), the WebSocket upgrade policy,
//! and the per-client Connection worker.

mod connection;
mod gateway;
mod handshake;

pub use connection::Connection;
pub use gateway::Gateway;
pub use handshake::UpgradePolicy;
