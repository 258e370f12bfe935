//! Metrics collection and exposition.
//!
//! # Metrics
//! - `comet_events_total` (counter): inbound events by outcome
//! - `comet_frames_total` (counter): frames enqueued by writers, by kind
//! - `comet_active_streams` (gauge): response streams still open
//!
//! Recording is a no-op until a recorder is installed, so library users
//! and tests pay nothing unless the binary enables the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// Count one inbound event by how it ended (`dispatched`, `rejected`, `failed`).
pub fn record_event(outcome: &'static str) {
    counter!("comet_events_total", "outcome" => outcome).increment(1);
}

/// Count one frame enqueued on a response writer.
pub fn record_frame(kind: &'static str) {
    counter!("comet_frames_total", "kind" => kind).increment(1);
}

pub fn stream_opened() {
    gauge!("comet_active_streams").increment(1.0);
}

pub fn stream_closed() {
    gauge!("comet_active_streams").decrement(1.0);
}
