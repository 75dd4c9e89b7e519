//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by service and status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `registry_lookups_total` (counter): lookups by outcome
//! - `registry_lookup_duration_seconds` (histogram): lookup latency
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! metrics-disabled runs pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one finished proxied request.
///
/// `service` is `None` for requests that never resolved to a backend, which
/// keeps unknown host names out of the label set.
pub fn record_request(service: Option<&str>, status: u16, started: Instant) {
    let service = service.unwrap_or("none").to_string();
    counter!(
        "proxy_requests_total",
        "service" => service.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "service" => service)
        .record(started.elapsed().as_secs_f64());
}

/// Record one registry lookup.
pub fn record_registry_lookup(success: bool, started: Instant) {
    let outcome = if success { "ok" } else { "error" };
    counter!("registry_lookups_total", "outcome" => outcome).increment(1);
    histogram!("registry_lookup_duration_seconds").record(started.elapsed().as_secs_f64());
}
