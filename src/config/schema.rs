//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Where to accept connections when no socket is handed down.
    pub listener: ListenerConfig,

    /// Service registry connection.
    pub registry: RegistryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Socket family: `tcp`, `tcp4`, `tcp6` or `unix`.
    pub protocol: String,

    /// Bind address. `host:port` for TCP (empty host = all interfaces),
    /// a filesystem path for `unix`.
    pub address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            protocol: "tcp".to_string(),
            address: ":8080".to_string(),
        }
    }
}

/// Consul agent connection settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Agent address, `host:port` or a full `http(s)://` URL.
    pub address: String,

    /// ACL token sent as `X-Consul-Token`.
    pub token: Option<String>,

    /// Datacenter to query instead of the agent's own.
    pub datacenter: Option<String>,

    /// Total timeout for one registry request. Unset = transport default.
    pub timeout_secs: Option<u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8500".to_string(),
            token: None,
            datacenter: None,
            timeout_secs: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Address for the metrics endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
