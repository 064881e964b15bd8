//! # Structured Logging
//!
//! Subscriber setup plus span macros for the engine's long-running loops.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{FlowsyncError, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Create a tracing span for xDS operations
#[macro_export]
macro_rules! xds_span {
    ($operation:expr, $node_id:expr) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $node_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for one synchronization cycle.
///
/// ```rust,ignore
/// let span = sync_span!("translate", cycle = 7);
/// ```
#[macro_export]
macro_rules! sync_span {
    ($phase:expr) => {
        tracing::debug_span!(
            "sync_cycle",
            phase = %$phase,
            cycle_id = %uuid::Uuid::new_v4()
        )
    };
    ($phase:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "sync_cycle",
            phase = %$phase,
            cycle_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            FlowsyncError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| FlowsyncError::internal(format!("Failed to install subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        xds_address = %config.xds.bind_address,
        rest_xds_address = ?config.xds.rest_bind_address,
        validation_enabled = config.validation.enabled,
        validation_address = %config.validation.bind_address,
        always_accept = config.validation.always_accept,
        allow_warnings = config.validation.allow_warnings,
        watch_namespaces = ?config.sync.namespaces(),
        discovery_enabled = config.discovery.enabled,
        warming_timeout_secs = config.discovery.endpoints_warming_timeout_secs,
        metrics_enabled = config.observability.enable_metrics,
        "flowsync configuration"
    );
}
