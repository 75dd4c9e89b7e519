//! Single-backend forwarding.
//!
//! # Responsibilities
//! - Rewrite the request URI to the resolved backend
//! - Drop hop-by-hop headers and record the client in `X-Forwarded-For`
//! - Stream the backend response back unchanged
//! - Tunnel protocol upgrades (WebSocket and friends) once the backend
//!   answers `101 Switching Protocols`
//! - Map backend connection failures to 502
//!
//! # Design Decisions
//! - A `SingleHostProxy` is built per request; only the pooled client is shared
//! - The inbound `Host` is forwarded as is, so virtual-hosted backends see
//!   the name the client asked for
//! - No retries, no failover

use std::net::IpAddr;

use axum::body::Body;
use axum::http::{header, uri::PathAndQuery, HeaderValue, Request, Response, StatusCode, Uri, Version};
use axum::response::IntoResponse;
use hyper::upgrade::OnUpgrade;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioIo},
};
use thiserror::Error;

use crate::http::response::error_response;
use crate::proxy::headers::{append_forwarded_for, restore_upgrade, strip_hop_by_hop, upgrade_protocol};
use crate::routing::BackendTarget;

/// Pooled HTTP client shared by every proxy instance.
pub type BackendClient = Client<HttpConnector, Body>;

/// Build the shared backend client.
pub fn build_client() -> BackendClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Error type for forwarding.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The target does not form a valid URI.
    #[error("invalid backend target {target}: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: axum::http::Error,
    },

    /// Connecting to or exchanging with the backend failed.
    #[error("upstream request to {target} failed: {source}")]
    Upstream {
        target: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    /// The backend switched to a protocol the client did not ask for.
    #[error("backend {target} switched to {offered:?} when {requested:?} was requested")]
    UpgradeMismatch {
        target: String,
        requested: Option<String>,
        offered: Option<String>,
    },
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        error_response(StatusCode::BAD_GATEWAY, "Upstream request failed")
    }
}

/// A reverse proxy bound to one backend.
#[derive(Debug, Clone)]
pub struct SingleHostProxy {
    client: BackendClient,
    target: BackendTarget,
}

impl SingleHostProxy {
    pub fn new(client: BackendClient, target: BackendTarget) -> Self {
        Self { client, target }
    }

    /// Point `uri` at the backend, keeping path and query.
    pub fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Uri::builder()
            .scheme(self.target.scheme.clone())
            .authority(self.target.authority().as_str())
            .path_and_query(path_and_query)
            .build()
            .map_err(|source| ProxyError::InvalidTarget {
                target: self.target.to_string(),
                source,
            })
    }

    /// Relay `request` to the backend and return its response.
    ///
    /// `client_ip` is appended to `X-Forwarded-For` when known.
    pub async fn forward(
        &self,
        mut request: Request<Body>,
        client_ip: Option<IpAddr>,
    ) -> Result<Response<Body>, ProxyError> {
        let requested = upgrade_protocol(request.headers());
        let client_upgrade = requested.as_ref().map(|_| hyper::upgrade::on(&mut request));
        let (mut parts, body) = request.into_parts();

        // HTTP/2 clients carry the host in the URI only.
        if !parts.headers.contains_key(header::HOST) {
            if let Some(authority) = parts.uri.authority() {
                if let Ok(value) = HeaderValue::from_str(authority.as_str()) {
                    parts.headers.insert(header::HOST, value);
                }
            }
        }

        parts.uri = self.rewrite_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers, true);
        if let Some(protocol) = &requested {
            restore_upgrade(&mut parts.headers, protocol.clone());
        }
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut parts.headers, ip);
        }

        tracing::trace!(method = %parts.method, uri = %parts.uri, "Forwarding request");

        let mut response = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .map_err(|source| ProxyError::Upstream {
                target: self.target.to_string(),
                source,
            })?;

        if response.status() == StatusCode::SWITCHING_PROTOCOLS {
            return self.switch_protocols(response, requested, client_upgrade);
        }

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers, false);
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    /// Relay a `101` to the client and join both upgraded connections.
    fn switch_protocols(
        &self,
        mut response: Response<hyper::body::Incoming>,
        requested: Option<HeaderValue>,
        client_upgrade: Option<OnUpgrade>,
    ) -> Result<Response<Body>, ProxyError> {
        let offered = upgrade_protocol(response.headers());
        let (protocol, client_upgrade) = match (&requested, offered, client_upgrade) {
            (Some(requested), Some(offered), Some(client_upgrade))
                if requested.as_bytes().eq_ignore_ascii_case(offered.as_bytes()) =>
            {
                (offered, client_upgrade)
            }
            (requested, offered, _) => {
                let text = |v: Option<&HeaderValue>| {
                    v.map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                };
                return Err(ProxyError::UpgradeMismatch {
                    target: self.target.to_string(),
                    requested: text(requested.as_ref()),
                    offered: text(offered.as_ref()),
                });
            }
        };

        let backend_upgrade = hyper::upgrade::on(&mut response);
        tokio::spawn(tunnel(self.target.to_string(), client_upgrade, backend_upgrade));

        let (mut parts, _) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers, false);
        restore_upgrade(&mut parts.headers, protocol);
        Ok(Response::from_parts(parts, Body::empty()))
    }
}

/// Copy bytes both ways until either side closes.
async fn tunnel(target: String, client: OnUpgrade, backend: OnUpgrade) {
    let (client, backend) = match tokio::try_join!(client, backend) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(backend = %target, error = %e, "Upgrade failed");
            return;
        }
    };

    let mut client = TokioIo::new(client);
    let mut backend = TokioIo::new(backend);
    match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
        Ok((sent, received)) => {
            tracing::debug!(backend = %target, sent, received, "Upgraded connection closed")
        }
        Err(e) => tracing::debug!(backend = %target, error = %e, "Upgraded connection ended"),
    }
}
