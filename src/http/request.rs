//! Per-request context extracted from inbound requests.
//!
//! # Responsibilities
//! - Correlate log lines with a request ID (propagated or generated)
//! - Expose the peer address when the listener provides one
//!
//! The request ID lives only in the tracing span; nothing is added to the
//! headers sent to the backend.

use std::net::{IpAddr, SocketAddr};

use axum::{body::Body, extract::ConnectInfo, http::Request};
use tracing::Span;
use uuid::Uuid;

use crate::routing::destination_host;

/// Header a front proxy may already have set.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request ID from the client or a fresh UUID v4.
pub fn request_id<B>(req: &Request<B>) -> String {
    req.headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Span wrapping one request, used by the trace layer.
pub fn make_request_span(req: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id(req),
        method = %req.method(),
        host = destination_host(req),
        path = %req.uri().path(),
    )
}

/// IP of the connected peer. `None` on unix-domain listeners.
pub fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}
