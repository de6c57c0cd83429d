//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("listen.path must start with '/', got '{0}'")]
    InvalidListenPath(String),
    #[error("tls.cert_path does not exist: {0}")]
    TlsCertNotFound(String),
    #[error("tls.key_path does not exist: {0}")]
    TlsKeyNotFound(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    if !config.listen.path.starts_with('/') {
        errors.push(ValidationError::InvalidListenPath(config.listen.path.clone()));
    }

    if let Some(ref tls) = config.tls {
        if !Path::new(&tls.cert_path).exists() {
            errors.push(ValidationError::TlsCertNotFound(tls.cert_path.clone()));
        }
        if !Path::new(&tls.key_path).exists() {
            errors.push(ValidationError::TlsKeyNotFound(tls.key_path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_tls(cert: &str, key: &str) -> Config {
        toml::from_str(&format!(
            r#"
[server]
name = "relay.test"

[listen]
address = "127.0.0.1:8080"

[tls]
address = "127.0.0.1:8443"
cert_path = "{cert}"
key_path = "{key}"
"#
        ))
        .unwrap()
    }

    #[test]
    fn missing_tls_files_are_reported() {
        let config = config_with_tls("/nonexistent/cert.pem", "/nonexistent/key.pem");
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::TlsCertNotFound(_)));
        assert!(matches!(errors[1], ValidationError::TlsKeyNotFound(_)));
    }

    #[test]
    fn existing_tls_files_pass() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();
        let config = config_with_tls(&cert.display().to_string(), &key.display().to_string());
        assert!(validate(&config).is_ok());
    }
}
