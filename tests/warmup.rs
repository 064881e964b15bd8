//! Startup barrier behavior of the assembled control plane.

mod support;

use async_trait::async_trait;
use flowsync::config::AppConfig;
use flowsync::discovery::MembershipSource;
use flowsync::domain::Upstream;
use flowsync::errors::Result;
use flowsync::translation::Endpoint;
use flowsync::xds::ConsumerKey;
use flowsync::{ControlPlane, Error};
use std::sync::Arc;
use std::time::Duration;
use support::*;
use tokio_util::sync::CancellationToken;

/// Membership lookups that never complete
struct Unresponsive;

#[async_trait]
impl MembershipSource for Unresponsive {
    async fn resolve(&self, _service: &str) -> Result<Vec<Endpoint>> {
        std::future::pending().await
    }
}

fn config(warming_timeout_secs: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.xds.bind_address = "127.0.0.1:0".into();
    config.xds.rest_bind_address = None;
    config.validation.enabled = false;
    config.discovery.enabled = true;
    config.discovery.refresh_interval_secs = 3600;
    config.discovery.endpoints_warming_timeout_secs = warming_timeout_secs;
    config
}

fn plane(warming_timeout_secs: u64) -> ControlPlane {
    let mut resources = tenant("default", 8080);
    resources.push(Upstream::discovered("default", "dynamic", "dynamic.default").into());
    ControlPlane::new(config(warming_timeout_secs), Arc::new(store_with(resources)))
        .with_membership_source(Arc::new(Unresponsive))
}

#[tokio::test]
async fn discovery_that_never_warms_up_fails_startup() {
    let err = tokio::time::timeout(Duration::from_secs(10), plane(1).run(CancellationToken::new()))
        .await
        .expect("startup returns")
        .expect_err("warm-up timeout");

    assert!(matches!(err, Error::WarmupTimeout { .. }));
    assert!(err.to_string().contains("discovery"));
}

#[tokio::test]
async fn zero_timeout_starts_without_waiting() {
    let plane = plane(0);
    let cache = plane.cache();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(plane.run(cancel.clone()));

    let key = ConsumerKey::new("default", PROXY);
    assert!(eventually(Duration::from_secs(5), || cache.version(&key) >= 1).await);
    assert!(cache.get_snapshot(&ConsumerKey::discovery()).is_none());

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await.expect("stops");
    result.expect("join").expect("clean shutdown");
}
