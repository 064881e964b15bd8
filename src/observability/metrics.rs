//! # Metrics Collection
//!
//! Prometheus metrics for the synchronizer, snapshot cache, xDS streams and
//! admission webhook. Recording goes through the `metrics` facade, so it is a
//! no-op until [`init_metrics`] installs the exporter.

use crate::config::ObservabilityConfig;
use crate::errors::{FlowsyncError, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Metrics recorder that tracks engine metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record the outcome of one synchronization cycle
    pub fn record_sync_cycle(&self, outcome: &'static str, duration: f64) {
        counter!("sync_cycles_total", "outcome" => outcome).increment(1);
        histogram!("sync_cycle_duration_seconds").record(duration);
    }

    /// Record a snapshot write that bumped a version
    pub fn record_snapshot_published(&self, key: &str) {
        counter!("snapshot_publishes_total", "key" => key.to_string()).increment(1);
    }

    /// Record a snapshot write that was deduplicated
    pub fn record_snapshot_noop(&self) {
        counter!("snapshot_noop_writes_total").increment(1);
    }

    /// Record an admission decision
    pub fn record_validation(&self, accepted: bool) {
        let outcome = if accepted { "accepted" } else { "rejected" };
        counter!("validation_requests_total", "outcome" => outcome).increment(1);
    }

    /// Record a status write-back
    pub fn record_status_write(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!("status_writes_total", "status" => status).increment(1);
    }

    /// Record an xDS stream connection event
    pub fn record_xds_connection(&self, connected: bool) {
        if connected {
            gauge!("xds_connections_active").increment(1.0);
        } else {
            gauge!("xds_connections_active").decrement(1.0);
        }
    }

    /// Record an ACK or NACK from a proxy
    pub fn record_xds_ack(&self, type_url: &str, acked: bool) {
        let status = if acked { "ack" } else { "nack" };
        counter!("xds_acks_total", "type_url" => type_url.to_string(), "status" => status)
            .increment(1);
    }

    /// Record a discovery round
    pub fn record_discovery_round(&self, success: bool, endpoint_sets: usize) {
        let status = if success { "success" } else { "error" };
        counter!("discovery_rounds_total", "status" => status).increment(1);
        gauge!("discovery_endpoint_sets").set(endpoint_sets as f64);
    }

    pub fn register_metrics(&self) {
        describe_counter!("sync_cycles_total", Unit::Count, "Synchronization cycles by outcome");
        describe_histogram!(
            "sync_cycle_duration_seconds",
            Unit::Seconds,
            "Time spent in one synchronization cycle"
        );
        describe_counter!(
            "snapshot_publishes_total",
            Unit::Count,
            "Snapshot writes that advanced a consumer key's version"
        );
        describe_counter!(
            "snapshot_noop_writes_total",
            Unit::Count,
            "Snapshot writes skipped because the graph was unchanged"
        );
        describe_counter!("validation_requests_total", Unit::Count, "Admission decisions");
        describe_counter!("status_writes_total", Unit::Count, "Status write-backs");
        describe_gauge!("xds_connections_active", Unit::Count, "Connected ADS streams");
        describe_counter!("xds_acks_total", Unit::Count, "ACK/NACK responses from proxies");
        describe_counter!("discovery_rounds_total", Unit::Count, "Endpoint discovery rounds");
        describe_gauge!("discovery_endpoint_sets", Unit::Count, "Endpoint sets last discovered");
    }
}

/// Initialize metrics collection and Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        FlowsyncError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            FlowsyncError::config(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    MetricsRecorder::new().register_metrics();

    info!(metrics_addr = %metrics_addr, service_name = %config.service_name, "Metrics collection initialized");
    Ok(())
}
