//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig) and loading
//! - [`listen`]: Network listener configuration (ListenConfig, TlsConfig)
//! - [`validation`]: Startup checks run by [`Config::load`]

mod listen;
mod types;
mod validation;

pub use listen::{ListenConfig, TlsConfig};
pub use types::{Config, ConfigError, ServerConfig};
pub use validation::ValidationError;
