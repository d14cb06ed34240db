//! Metrics collection and exposition.
//!
//! # Metrics
//! - `stun_requests_latency_seconds` (histogram): round-trip time by endpoint ip
//! - `stun_requests_sent_total` (counter): probes sent by endpoint ip
//! - `stun_requests_completed_total` (counter): probes answered by endpoint ip
//! - `stun_requests_failed_total` (counter): probes timed out by endpoint ip
//! - `stun_fleet_endpoints` (gauge): endpoints currently probed
//! - `stun_fleet_healthy` (gauge): 1=healthy, 0=degraded

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Counter,
    Histogram,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Latency buckets: 2ms doubling twelve times (about 4s).
const LATENCY_BUCKETS: [f64; 12] = [
    0.002, 0.004, 0.008, 0.016, 0.032, 0.064, 0.128, 0.256, 0.512, 1.024, 2.048, 4.096,
];

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    let builder = match builder.set_buckets_for_metric(
        metrics_exporter_prometheus::Matcher::Full("stun_requests_latency_seconds".to_string()),
        &LATENCY_BUCKETS,
    ) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "Invalid latency buckets");
            return;
        }
    };

    match builder.install() {
        Ok(()) => {
            register_metric_descriptions();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn register_metric_descriptions() {
    describe_histogram!(
        "stun_requests_latency_seconds",
        "STUN request latency in seconds"
    );
    describe_counter!("stun_requests_sent_total", "STUN binding requests sent");
    describe_counter!(
        "stun_requests_completed_total",
        "STUN binding requests answered"
    );
    describe_counter!(
        "stun_requests_failed_total",
        "STUN binding requests that timed out"
    );
    describe_gauge!("stun_fleet_endpoints", "STUN endpoints currently probed");
    describe_gauge!("stun_fleet_healthy", "Overall fleet health (1=healthy)");
}

/// Per-endpoint metric handles, resolved once when a probe client is built.
#[derive(Clone)]
pub struct ProbeMetrics {
    latency: Histogram,
    sent: Counter,
    completed: Counter,
    failed: Counter,
}

impl ProbeMetrics {
    pub fn for_endpoint(remote: SocketAddr) -> Self {
        let ip = remote.ip().to_string();
        Self {
            latency: histogram!("stun_requests_latency_seconds", "ip" => ip.clone()),
            sent: counter!("stun_requests_sent_total", "ip" => ip.clone()),
            completed: counter!("stun_requests_completed_total", "ip" => ip.clone()),
            failed: counter!("stun_requests_failed_total", "ip" => ip),
        }
    }

    pub fn record_sent(&self) {
        self.sent.increment(1);
    }

    pub fn record_completed(&self, latency: Duration) {
        self.completed.increment(1);
        self.latency.record(latency.as_secs_f64());
    }

    pub fn record_failed(&self) {
        self.failed.increment(1);
    }
}

impl std::fmt::Debug for ProbeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeMetrics").finish_non_exhaustive()
    }
}

/// Update fleet-level gauges after a health evaluation.
pub fn record_fleet_health(endpoints: usize, healthy: bool) {
    gauge!("stun_fleet_endpoints").set(endpoints as f64);
    gauge!("stun_fleet_healthy").set(if healthy { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_recording() {
        // No recorder installed: these must be no-ops, not panics.
        let m = ProbeMetrics::for_endpoint("127.0.0.1:3478".parse().unwrap());
        m.record_sent();
        m.record_completed(Duration::from_millis(12));
        m.record_failed();
        record_fleet_health(3, false);
    }
}
