//! Route lookup against the live registry.
//!
//! # Responsibilities
//! - Resolve the request's service name through the registry
//! - Produce the backend target or an explicit error
//!
//! # Design Decisions
//! - One registry round-trip per request, no caching
//! - Registry failures and unknown services are request-scoped errors
//! - One endpoint per name; no selection policy between instances

use std::fmt;
use std::time::Instant;

use axum::http::{uri::Scheme, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::response::error_response;
use crate::observability::metrics;
use crate::registry::{RegistryError, ServiceEndpoint, ServiceRegistry};
use crate::routing::host::{destination_host, service_name};

/// Where a request is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl BackendTarget {
    /// Plain-HTTP target for a registry endpoint.
    pub fn http(endpoint: &ServiceEndpoint) -> Self {
        Self {
            scheme: Scheme::HTTP,
            host: endpoint.address.clone(),
            port: endpoint.port,
        }
    }

    /// `host:port` suitable for a URI authority.
    ///
    /// IPv6 literals are bracketed. An empty host means the local system,
    /// as it does for dialers.
    pub fn authority(&self) -> String {
        let host = self.host.as_str();
        if host.is_empty() {
            format!("127.0.0.1:{}", self.port)
        } else if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

/// Why a request could not be routed.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Service {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::NotFound(_) => StatusCode::NOT_FOUND,
            RouteError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        error_response(self.status(), &self.to_string())
    }
}

/// Resolve `request` to a backend using a fresh catalog from `registry`.
pub async fn route<B>(
    registry: &dyn ServiceRegistry,
    request: &Request<B>,
) -> Result<BackendTarget, RouteError> {
    resolve_host(registry, destination_host(request)).await
}

/// Resolve a destination host to a backend.
///
/// Split out from [`route`] so handlers can release the request borrow
/// before awaiting.
pub async fn resolve_host(
    registry: &dyn ServiceRegistry,
    host: &str,
) -> Result<BackendTarget, RouteError> {
    let name = service_name(host);

    let started = Instant::now();
    let lookup = registry.lookup_all_services().await;
    metrics::record_registry_lookup(lookup.is_ok(), started);

    let catalog = lookup.map_err(|e| {
        tracing::warn!(host, error = %e, "Registry lookup failed");
        RouteError::Registry(e)
    })?;

    let Some(endpoint) = catalog.get(name) else {
        tracing::debug!(host, service = name, "Service not registered");
        return Err(RouteError::NotFound(name.to_string()));
    };

    let target = BackendTarget::http(endpoint);
    tracing::debug!(host, service = name, backend = %target, "Resolved backend");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticRegistry;
    use axum::body::Body;

    fn request_for(host: &str) -> Request<Body> {
        Request::builder()
            .uri("/")
            .header("Host", host)
            .body(Body::empty())
            .unwrap()
    }

    fn registry() -> StaticRegistry {
        let registry = StaticRegistry::new();
        registry.insert("foo", ServiceEndpoint::new("10.0.0.5", 9000));
        registry.insert("localhost:8080", ServiceEndpoint::new("10.0.0.9", 80));
        registry
    }

    #[tokio::test]
    async fn resolves_registered_service() {
        let target = route(&registry(), &request_for("foo.example.com"))
            .await
            .unwrap();
        assert_eq!(target.scheme, Scheme::HTTP);
        assert_eq!(target.host, "10.0.0.5");
        assert_eq!(target.port, 9000);
        assert_eq!(target.to_string(), "http://10.0.0.5:9000");
    }

    #[tokio::test]
    async fn dotless_host_is_looked_up_whole() {
        let target = route(&registry(), &request_for("localhost:8080"))
            .await
            .unwrap();
        assert_eq!(target.authority(), "10.0.0.9:80");
    }

    #[tokio::test]
    async fn unknown_service_is_not_found() {
        let err = route(&registry(), &request_for("bar.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(&err, RouteError::NotFound(name) if name == "bar"));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Service bar not found");
    }

    #[tokio::test]
    async fn empty_host_is_not_found() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let err = route(&registry(), &request).await.unwrap_err();
        assert_eq!(err.to_string(), "Service  not found");
    }

    #[tokio::test]
    async fn registry_failure_is_internal_error() {
        let registry = registry();
        registry.set_failure(Some("dial tcp 127.0.0.1:8500: connection refused".into()));

        let err = route(&registry, &request_for("foo.example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "dial tcp 127.0.0.1:8500: connection refused"
        );
    }

    #[tokio::test]
    async fn error_responses_carry_message() {
        let response = RouteError::NotFound("foo".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Service foo not found\n");
    }

    #[test]
    fn authority_formatting() {
        let ipv6 = BackendTarget::http(&ServiceEndpoint::new("fd00::5", 9000));
        assert_eq!(ipv6.authority(), "[fd00::5]:9000");

        let empty = BackendTarget::http(&ServiceEndpoint::new("", 9000));
        assert_eq!(empty.authority(), "127.0.0.1:9000");

        let named = BackendTarget::http(&ServiceEndpoint::new("web.node.consul", 80));
        assert_eq!(named.to_string(), "http://web.node.consul:80");
    }
}
