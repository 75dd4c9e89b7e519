//! Registry data types and errors.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One instance of a named service as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Network address (IP or hostname). May be empty if the service was
    /// registered without one.
    pub address: String,
    /// Service port.
    pub port: u16,
}

impl ServiceEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

/// Snapshot of the registry: service name → endpoint.
pub type ServiceCatalog = HashMap<String, ServiceEndpoint>;

/// Errors raised while talking to the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The configured registry address could not be turned into a URL.
    #[error("invalid registry address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build registry client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request never produced a response (refused, reset, timed out).
    #[error("registry request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The registry answered with a non-success status.
    #[error("Unexpected response code: {status} ({body})")]
    Status { status: u16, body: String },

    /// The response body was not a service map.
    #[error("failed to decode registry response: {0}")]
    Decode(#[source] reqwest::Error),

    /// The registry is unavailable for some other reason.
    #[error("{0}")]
    Unavailable(String),
}
