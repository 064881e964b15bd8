//! # Configuration Settings
//!
//! Defines the configuration structure for the flowsync engine.

use crate::errors::{FlowsyncError, Result};
use crate::sanitize::InvalidConfigPolicy;
use crate::validation::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// xDS streaming and REST fetch servers
    #[validate(nested)]
    pub xds: XdsConfig,

    /// Admission webhook and validation policy
    #[validate(nested)]
    pub validation: ValidationConfig,

    /// Synchronizer loop and sanitization policy
    #[validate(nested)]
    pub sync: SyncConfig,

    /// Endpoint discovery and warm-up
    #[validate(nested)]
    pub discovery: DiscoveryConfig,

    /// Logging and metrics
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(FlowsyncError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Checks the validator derive cannot express: addresses parse and do not collide
    fn validate_custom(&self) -> Result<()> {
        let mut seen: HashMap<SocketAddr, &'static str> = HashMap::new();
        let mut claim = |label: &'static str, raw: &str| -> Result<()> {
            let addr: SocketAddr = raw.parse().map_err(|e| {
                FlowsyncError::validation_field(
                    format!("Invalid bind address '{}': {}", raw, e),
                    label,
                )
            })?;
            if let Some(other) = seen.insert(addr, label) {
                return Err(FlowsyncError::validation(format!(
                    "{} and {} cannot share bind address {}",
                    other, label, addr
                )));
            }
            Ok(())
        };

        claim("xds.bind_address", &self.xds.bind_address)?;
        if let Some(rest) = self.xds.rest_bind_address.as_deref() {
            claim("xds.rest_bind_address", rest)?;
        }
        if self.validation.enabled {
            claim("validation.bind_address", &self.validation.bind_address)?;
        }
        if self.validation.tls_cert_path.is_some() != self.validation.tls_key_path.is_some() {
            return Err(FlowsyncError::validation_field(
                "Webhook TLS needs both tls_cert_path and tls_key_path",
                "validation.tls_cert_path",
            ));
        }
        if let Some(metrics) = self.observability.metrics_bind_address() {
            claim("observability.metrics_port", &metrics)?;
        }

        if self.sync.retry_max_ms < self.sync.retry_initial_ms {
            return Err(FlowsyncError::validation(
                "sync.retry_max_ms must not be lower than sync.retry_initial_ms",
            ));
        }

        if self.sync.write_namespace.is_empty() {
            return Err(FlowsyncError::validation_field(
                "Write namespace cannot be empty",
                "sync.write_namespace",
            ));
        }

        Ok(())
    }
}

/// xDS server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct XdsConfig {
    /// gRPC ADS bind address
    #[validate(length(min = 1, message = "xDS bind address cannot be empty"))]
    pub bind_address: String,

    /// Plain HTTP fetch server bind address (None disables it)
    pub rest_bind_address: Option<String>,
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9977".to_string(),
            rest_bind_address: Some("0.0.0.0:9976".to_string()),
        }
    }
}

/// Admission webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ValidationConfig {
    /// Serve the admission webhook
    pub enabled: bool,

    #[validate(length(min = 1, message = "Validation bind address cannot be empty"))]
    pub bind_address: String,

    /// Report problems as warnings but admit the change anyway
    pub always_accept: bool,

    /// Admit changes that only produce warnings
    pub allow_warnings: bool,

    /// PEM certificate chain for serving the webhook over HTTPS
    pub tls_cert_path: Option<PathBuf>,

    /// PEM private key matching `tls_cert_path`
    pub tls_key_path: Option<PathBuf>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8443".to_string(),
            always_accept: true,
            allow_warnings: true,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ValidationConfig {
    pub fn policy(&self) -> ValidationPolicy {
        ValidationPolicy { always_accept: self.always_accept, allow_warnings: self.allow_warnings }
    }

    /// Certificate and key paths, when the webhook serves HTTPS
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

/// Synchronizer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period that merges bursts of change notifications
    #[validate(range(max = 60000, message = "Coalescing window must be at most 60000ms"))]
    pub coalesce_window_ms: u64,

    /// First store retry delay
    #[validate(range(min = 1, message = "Initial retry delay must be at least 1ms"))]
    pub retry_initial_ms: u64,

    /// Retry delay cap
    #[validate(range(min = 1, message = "Maximum retry delay must be at least 1ms"))]
    pub retry_max_ms: u64,

    /// Namespaces to watch (empty = all namespaces)
    pub watch_namespaces: Vec<String>,

    /// Namespace the engine writes into; always watched
    pub write_namespace: String,

    /// Owner token for status written back to resources
    #[validate(length(min = 1, message = "Status owner cannot be empty"))]
    pub status_owner: String,

    /// Replace routes with a missing destination by a direct response instead of dropping them
    pub replace_invalid_routes: bool,

    #[validate(range(
        min = 100,
        max = 599,
        message = "Invalid route response code must be a valid HTTP status"
    ))]
    pub invalid_route_response_code: u16,

    pub invalid_route_response_body: String,

    /// Drop clusters that no route references
    pub remove_orphaned_clusters: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let policy = InvalidConfigPolicy::default();
        Self {
            coalesce_window_ms: 100,
            retry_initial_ms: 100,
            retry_max_ms: 10_000,
            watch_namespaces: Vec::new(),
            write_namespace: "flowsync-system".to_string(),
            status_owner: "flowsync".to_string(),
            replace_invalid_routes: policy.replace_invalid_routes,
            invalid_route_response_code: policy.invalid_route_response_code,
            invalid_route_response_body: policy.invalid_route_response_body,
            remove_orphaned_clusters: policy.remove_orphaned_clusters,
        }
    }
}

impl SyncConfig {
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn retry_initial(&self) -> Duration {
        Duration::from_millis(self.retry_initial_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms)
    }

    /// Effective namespaces: empty means all, otherwise the write namespace is added
    pub fn namespaces(&self) -> Vec<String> {
        if self.watch_namespaces.is_empty() {
            return Vec::new();
        }
        let mut namespaces = self.watch_namespaces.clone();
        if !namespaces.contains(&self.write_namespace) {
            namespaces.push(self.write_namespace.clone());
        }
        namespaces.sort();
        namespaces.dedup();
        namespaces
    }

    pub fn sanitize_policy(&self) -> InvalidConfigPolicy {
        InvalidConfigPolicy {
            replace_invalid_routes: self.replace_invalid_routes,
            invalid_route_response_code: self.invalid_route_response_code,
            invalid_route_response_body: self.invalid_route_response_body.clone(),
            remove_orphaned_clusters: self.remove_orphaned_clusters,
        }
    }
}

/// Endpoint discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Run the discovery loop
    pub enabled: bool,

    #[validate(range(min = 1, max = 3600, message = "Refresh interval must be between 1 and 3600 seconds"))]
    pub refresh_interval_secs: u64,

    /// Warm-up barrier; 0 disables waiting
    pub endpoints_warming_timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { enabled: true, refresh_interval_secs: 30, endpoints_warming_timeout_secs: 300 }
    }
}

impl DiscoveryConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn warming_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoints_warming_timeout_secs)
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus exporter
    pub enable_metrics: bool,

    /// Metrics port (0 = disabled)
    pub metrics_port: u16,

    /// Log level filter used when RUST_LOG is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit logs as JSON
    pub json_logging: bool,

    /// Service name attached to metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_port: 9091,
            log_level: "info".to_string(),
            json_logging: false,
            service_name: "flowsync".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if !self.enable_metrics || self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}
