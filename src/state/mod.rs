//! State management module.
//!
//! Contains the session registry (shared relay state) and the session,
//! peer, and connection-handle entities stored in it.

mod registry;
mod session;

pub use registry::{Registry, RegistryGuard};
pub use session::{ConnectionHandle, Outbound, Peer, Session, SessionId};
