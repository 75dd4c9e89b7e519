//! Configuration validation.
//!
//! Returns all validation errors, not just the first. Pure function:
//! `ProxyConfig → Result<(), Vec<ValidationError>>`.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::net::listener::Protocol;
use crate::registry::consul::parse_address;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.protocol: unsupported protocol '{0}' (expected tcp, tcp4, tcp6 or unix)")]
    UnknownProtocol(String),

    #[error("listener.address: must not be empty")]
    EmptyListenerAddress,

    #[error("registry.address: {0}")]
    RegistryAddress(String),

    #[error("registry.timeout_secs: must be greater than zero")]
    ZeroRegistryTimeout,

    #[error("observability.metrics_address: '{0}' is not a socket address")]
    MetricsAddress(String),
}

/// Check a fully merged configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.protocol.parse::<Protocol>().is_err() {
        errors.push(ValidationError::UnknownProtocol(
            config.listener.protocol.clone(),
        ));
    }
    if config.listener.address.trim().is_empty() {
        errors.push(ValidationError::EmptyListenerAddress);
    }

    if let Err(e) = parse_address(&config.registry.address) {
        errors.push(ValidationError::RegistryAddress(e.to_string()));
    }
    if config.registry.timeout_secs == Some(0) {
        errors.push(ValidationError::ZeroRegistryTimeout);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
