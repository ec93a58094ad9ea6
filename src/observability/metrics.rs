//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, status, route
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_snapshot_routes` / `proxy_snapshot_clusters` (gauge): current table size
//! - `proxy_snapshots_published_total` (counter)
//! - `proxy_session_events_total` (counter): control events by kind and outcome
//! - `proxy_control_channel_state` (gauge): 0=disconnected, 1=connecting, 2=connected
//! - `proxy_control_channel_reconnects_total` (counter)
//! - `proxy_location_rewrites_total` (counter)
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::control::ChannelState;
use crate::routing::Snapshot;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_snapshot(snapshot: &Snapshot) {
    gauge!("proxy_snapshot_routes").set(snapshot.routes().len() as f64);
    gauge!("proxy_snapshot_clusters").set(snapshot.clusters().len() as f64);
    counter!("proxy_snapshots_published_total").increment(1);
}

pub fn record_session_event(kind: &'static str, outcome: &'static str) {
    counter!("proxy_session_events_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_channel_state(state: ChannelState) {
    let value = match state {
        ChannelState::Disconnected => 0.0,
        ChannelState::Connecting => 1.0,
        ChannelState::Connected => 2.0,
    };
    gauge!("proxy_control_channel_state").set(value);
}

pub fn record_reconnect() {
    counter!("proxy_control_channel_reconnects_total").increment(1);
}

pub fn record_location_rewrite() {
    counter!("proxy_location_rewrites_total").increment(1);
}
