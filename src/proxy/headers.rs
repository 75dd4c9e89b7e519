//! Header handling for proxied exchanges.
//!
//! Hop-by-hop headers describe a single connection and are dropped in both
//! directions; end-to-end headers pass through untouched. The one exception
//! is a protocol upgrade, whose `Connection`/`Upgrade` pair is put back.

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// Headers that apply to one connection only (RFC 9110 §7.6.1).
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Remove hop-by-hop headers, including any named in `Connection`.
///
/// With `keep_te_trailers`, a `TE` header that offers `trailers` survives
/// as `TE: trailers` so the backend may still send trailers.
pub fn strip_hop_by_hop(headers: &mut HeaderMap, keep_te_trailers: bool) {
    let offers_trailers = keep_te_trailers
        && tokens(headers, header::TE).any(|token| token.eq_ignore_ascii_case("trailers"));

    let listed: Vec<HeaderName> = tokens(headers, header::CONNECTION)
        .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    for name in HOP_BY_HOP {
        headers.remove(name);
    }

    if offers_trailers {
        headers.insert(header::TE, HeaderValue::from_static("trailers"));
    }
}

/// The protocol named in `Upgrade`, when `Connection` asks for an upgrade.
pub fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    if !tokens(headers, header::CONNECTION).any(|token| token.eq_ignore_ascii_case("upgrade")) {
        return None;
    }
    headers.get(header::UPGRADE).cloned()
}

/// Put back the upgrade headers after [`strip_hop_by_hop`].
pub fn restore_upgrade(headers: &mut HeaderMap, protocol: HeaderValue) {
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::UPGRADE, protocol);
}

/// Comma-separated tokens across every value of `name`.
fn tokens(headers: &HeaderMap, name: HeaderName) -> impl Iterator<Item = &str> {
    headers
        .get_all(name)
        .into_iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Append the client address to `X-Forwarded-For`.
///
/// Existing values (from proxies in front of us) are joined into one
/// comma-separated list with the client last.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client)
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
