//! # Flowsync
//!
//! Translation and synchronization engine for an Envoy gateway control plane.
//! Declarative gateway objects (gateways, virtual services, route tables,
//! upstreams, secrets) are translated into per-proxy xDS snapshots and served
//! over the Aggregated Discovery Service.
//!
//! ## Architecture
//!
//! ```text
//! ResourceStore → Synchronizer → ConfigPipeline → SnapshotCache → ADS streams → Envoy
//!       ↑              ↓              ↑                ↑
//!  StatusReporter  Validator ←── admission webhook   DiscoverySubsystem
//! ```
//!
//! ## Core Components
//!
//! - **Translation**: snapshot of objects to a proxy graph plus per-object findings
//! - **Sanitization**: repairs or drops invalid fragments so one bad object cannot
//!   block the rest
//! - **Snapshot cache**: versioned per-consumer graphs with change notification
//! - **xDS server**: tonic-based SotW ADS with ACK/NACK tracking
//! - **HTTP surfaces**: REST snapshot fetch, health probes and the admission webhook
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use flowsync::{config::AppConfig, startup::ControlPlane, store::InMemoryResourceStore, Result};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let store = Arc::new(InMemoryResourceStore::new());
//!     ControlPlane::new(config, store).run(CancellationToken::new()).await
//! }
//! ```

pub mod api;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod sanitize;
pub mod startup;
pub mod store;
pub mod syncer;
pub mod translation;
pub mod validation;
pub mod xds;

pub use config::AppConfig;
pub use errors::{Error, Result};
pub use startup::ControlPlane;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "flowsync");
    }
}
