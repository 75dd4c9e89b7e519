//! Service name extraction.
//!
//! # Responsibilities
//! - Find the destination host the client addressed
//! - Take its first label as the service name
//!
//! # Design Decisions
//! - No normalization: case, ports and empty labels pass through unchanged,
//!   so the registry's own naming decides what matches
//! - Absolute-form / HTTP/2 authority wins over the `Host` header

use axum::http::{header, Request};

/// The destination host as presented by the client, or `""` when absent.
pub fn destination_host<B>(req: &Request<B>) -> &str {
    if let Some(authority) = req.uri().authority() {
        return authority.as_str();
    }
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
}

/// Everything before the first `.`, or the whole host if it has none.
pub fn service_name(host: &str) -> &str {
    match host.split_once('.') {
        Some((name, _)) => name,
        None => host,
    }
}
