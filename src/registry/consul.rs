//! Consul agent client.
//!
//! # Responsibilities
//! - Resolve the agent address (`host:port` or full URL) into a base URL
//! - Query `/v1/agent/services` with the configured ACL token and datacenter
//! - Map the agent's service map into a `ServiceCatalog`
//!
//! The catalog is keyed by the agent map's keys (service IDs), which Consul
//! defaults to the service name.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::RegistryConfig;
use crate::registry::types::{RegistryError, ServiceCatalog, ServiceEndpoint};
use crate::registry::ServiceRegistry;

/// Path of the agent endpoint listing locally registered services.
const AGENT_SERVICES_PATH: &str = "v1/agent/services";

/// Header carrying the ACL token.
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Subset of the agent's service record that routing needs.
#[derive(Debug, Deserialize)]
struct AgentService {
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port", default)]
    port: u16,
}

impl From<AgentService> for ServiceEndpoint {
    fn from(service: AgentService) -> Self {
        ServiceEndpoint::new(service.address, service.port)
    }
}

/// Client for a Consul agent's HTTP API.
///
/// Cheap to share: the inner `reqwest::Client` pools connections and is
/// safe for concurrent use.
#[derive(Debug, Clone)]
pub struct ConsulClient {
    http: reqwest::Client,
    services_url: Url,
    token: Option<String>,
    datacenter: Option<String>,
}

impl ConsulClient {
    /// Build a client from registry configuration.
    ///
    /// No request is made here; an unreachable agent only shows up on the
    /// first lookup.
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let base_url = parse_address(&config.address)?;
        let services_url = base_url
            .join(AGENT_SERVICES_PATH)
            .map_err(|e| RegistryError::InvalidAddress {
                address: config.address.clone(),
                reason: e.to_string(),
            })?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(RegistryError::Client)?;

        tracing::debug!(
            url = %services_url,
            token = config.token.is_some(),
            datacenter = ?config.datacenter,
            "Consul client created"
        );

        Ok(Self {
            http,
            services_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
            datacenter: config.datacenter.clone().filter(|dc| !dc.is_empty()),
        })
    }
}

#[async_trait]
impl ServiceRegistry for ConsulClient {
    async fn lookup_all_services(&self) -> Result<ServiceCatalog, RegistryError> {
        let mut request = self.http.get(self.services_url.clone());
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(dc) = &self.datacenter {
            request = request.query(&[("dc", dc)]);
        }

        let response = request.send().await.map_err(RegistryError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let services: HashMap<String, AgentService> =
            response.json().await.map_err(RegistryError::Decode)?;

        Ok(services
            .into_iter()
            .map(|(name, service)| (name, service.into()))
            .collect())
    }
}

/// Turn an agent address into a base URL ending in `/`.
///
/// Accepts bare `host:port` (http assumed) or a full `http(s)://` URL,
/// matching how Consul's own tooling reads `CONSUL_HTTP_ADDR`.
pub fn parse_address(address: &str) -> Result<Url, RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid("address is empty".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
