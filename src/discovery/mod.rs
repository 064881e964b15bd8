//! # Endpoint Discovery
//!
//! Resolves `Discovered` upstreams into endpoint sets and publishes them under
//! the discovery consumer key. Runs beside the synchronizer: a refresh on a
//! fixed interval plus one on every upstream change.

pub mod warmup;

pub use warmup::wait_for_ready;

use crate::config::DiscoveryConfig;
use crate::domain::{Resource, ResourceKind, UpstreamSpec};
use crate::errors::Result;
use crate::observability::MetricsRecorder;
use crate::store::{ChangeBatch, ResourceStore};
use crate::translation::{cluster_name, Endpoint, EndpointSet, Fragment, ProxyGraph};
use crate::xds::{ConsumerKey, SnapshotCache};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the members of a discovered service come from
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn resolve(&self, service: &str) -> Result<Vec<Endpoint>>;
}

/// Membership kept in memory and set by hand; unknown services have no members
#[derive(Debug, Default)]
pub struct StaticMembershipSource {
    members: RwLock<HashMap<String, Vec<Endpoint>>>,
}

impl StaticMembershipSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, service: impl Into<String>, endpoints: Vec<Endpoint>) {
        match self.members.write() {
            Ok(mut members) => {
                members.insert(service.into(), endpoints);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(service.into(), endpoints);
            }
        }
    }
}

#[async_trait]
impl MembershipSource for StaticMembershipSource {
    async fn resolve(&self, service: &str) -> Result<Vec<Endpoint>> {
        let members = match self.members.read() {
            Ok(members) => members.get(service).cloned(),
            Err(poisoned) => poisoned.into_inner().get(service).cloned(),
        };
        Ok(members.unwrap_or_default())
    }
}

/// Resolves `host:port` service names through the system resolver
#[derive(Debug, Clone, Copy)]
pub struct DnsMembershipSource {
    default_port: u16,
}

impl DnsMembershipSource {
    pub fn new(default_port: u16) -> Self {
        Self { default_port }
    }
}

impl Default for DnsMembershipSource {
    fn default() -> Self {
        Self::new(80)
    }
}

#[async_trait]
impl MembershipSource for DnsMembershipSource {
    async fn resolve(&self, service: &str) -> Result<Vec<Endpoint>> {
        let target = if service.contains(':') {
            service.to_string()
        } else {
            format!("{}:{}", service, self.default_port)
        };

        let addrs = tokio::net::lookup_host(&target).await.map_err(|e| crate::Error::Io {
            source: e,
            context: format!("Failed to resolve service {}", target),
        })?;

        let mut endpoints: Vec<Endpoint> = addrs
            .map(|addr| Endpoint { address: addr.ip().to_string(), port: addr.port(), weight: 1 })
            .collect();
        endpoints.sort_by(|a, b| (&a.address, a.port).cmp(&(&b.address, b.port)));
        endpoints.dedup();
        Ok(endpoints)
    }
}

async fn next_change(changes: &mut Option<BoxStream<'static, ChangeBatch>>) -> Option<ChangeBatch> {
    match changes {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

pub struct DiscoverySubsystem {
    store: Arc<dyn ResourceStore>,
    cache: Arc<SnapshotCache>,
    source: Arc<dyn MembershipSource>,
    namespaces: Vec<String>,
    refresh_interval: Duration,
    ready: watch::Sender<bool>,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for DiscoverySubsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoverySubsystem")
            .field("namespaces", &self.namespaces)
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

impl DiscoverySubsystem {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        cache: Arc<SnapshotCache>,
        source: Arc<dyn MembershipSource>,
        config: &DiscoveryConfig,
        namespaces: Vec<String>,
    ) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            store,
            cache,
            source,
            namespaces,
            refresh_interval: config.refresh_interval(),
            ready,
            metrics: MetricsRecorder::new(),
        }
    }

    /// Flips to `true` after the first successful round
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// One discovery round; returns the number of endpoint sets published.
    /// A service that fails to resolve keeps its previous endpoints.
    pub async fn refresh(&self) -> Result<usize> {
        let upstreams = match self.store.list(ResourceKind::Upstream, &self.namespaces).await {
            Ok(upstreams) => upstreams,
            Err(e) => {
                self.metrics.record_discovery_round(false, 0);
                return Err(e);
            }
        };
        let previous = self.cache.get_snapshot(&ConsumerKey::discovery());

        let mut graph = ProxyGraph::new();
        for resource in upstreams {
            let key = resource.resource_ref();
            let Resource::Upstream(upstream) = resource else {
                continue;
            };
            let UpstreamSpec::Discovered { service } = &upstream.spec else {
                continue;
            };
            let cluster = cluster_name(&key);

            let endpoints = match self.source.resolve(service).await {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    warn!(service = %service, cluster = %cluster, error = %e, "failed to resolve service");
                    match previous.as_ref().and_then(|p| p.graph.endpoints.get(&cluster)) {
                        Some(set) => set.endpoints.clone(),
                        None => continue,
                    }
                }
            };
            debug!(cluster = %cluster, endpoints = endpoints.len(), "resolved endpoints");
            graph.insert(Fragment::Endpoints(EndpointSet { cluster, endpoints }));
        }

        let count = graph.endpoints.len();
        self.cache.set_snapshot(&ConsumerKey::discovery(), graph);
        self.metrics.record_discovery_round(true, count);
        self.ready.send_if_modified(|ready| !std::mem::replace(ready, true));
        Ok(count)
    }

    async fn refresh_logged(&self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "discovery round failed");
        }
    }

    /// Refresh until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(interval_secs = self.refresh_interval.as_secs(), "endpoint discovery starting");

        let mut changes = match self.store.watch(&[ResourceKind::Upstream], &self.namespaces).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "cannot watch upstreams, relying on periodic refresh");
                None
            }
        };

        let mut ticker = tokio::time::interval(self.refresh_interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let refresh = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => true,
                batch = next_change(&mut changes) => batch.is_some(),
            };

            if refresh {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.refresh_logged() => {}
                }
            } else {
                warn!("upstream watch closed, relying on periodic refresh");
                changes = None;
            }
        }

        info!("endpoint discovery stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Host, Upstream};
    use crate::store::InMemoryResourceStore;

    struct FailingSource;

    #[async_trait]
    impl MembershipSource for FailingSource {
        async fn resolve(&self, service: &str) -> Result<Vec<Endpoint>> {
            Err(crate::Error::transport(format!("{} unreachable", service)))
        }
    }

    fn endpoint(address: &str) -> Endpoint {
        Endpoint { address: address.into(), port: 8080, weight: 1 }
    }

    fn store() -> InMemoryResourceStore {
        InMemoryResourceStore::from_resources(vec![
            Upstream::discovered("default", "svc", "svc.default").into(),
            Upstream::with_hosts("default", "static", vec![Host::new("10.0.0.1", 80)]).into(),
        ])
        .expect("store")
    }

    fn subsystem(source: Arc<dyn MembershipSource>, cache: Arc<SnapshotCache>) -> DiscoverySubsystem {
        DiscoverySubsystem::new(
            Arc::new(store()),
            cache,
            source,
            &DiscoveryConfig::default(),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_round_publishes_discovered_only() {
        let source = Arc::new(StaticMembershipSource::new());
        source.set("svc.default", vec![endpoint("10.1.0.1"), endpoint("10.1.0.2")]);
        let cache = Arc::new(SnapshotCache::new());
        let discovery = subsystem(source, cache.clone());
        let ready = discovery.readiness();

        assert_eq!(discovery.refresh().await.expect("round"), 1);
        assert!(*ready.borrow());

        let snapshot = cache.get_snapshot(&ConsumerKey::discovery()).expect("published");
        assert_eq!(snapshot.graph.endpoints["default_svc"].endpoints.len(), 2);
        assert!(!snapshot.graph.endpoints.contains_key("default_static"));
    }

    #[tokio::test]
    async fn test_unchanged_membership_is_noop() {
        let source = Arc::new(StaticMembershipSource::new());
        source.set("svc.default", vec![endpoint("10.1.0.1")]);
        let cache = Arc::new(SnapshotCache::new());
        let discovery = subsystem(source, cache.clone());

        discovery.refresh().await.expect("round");
        discovery.refresh().await.expect("round");
        assert_eq!(cache.version(&ConsumerKey::discovery()), 1);
    }

    #[tokio::test]
    async fn test_failed_resolution_skips_service() {
        let cache = Arc::new(SnapshotCache::new());
        let discovery = subsystem(Arc::new(FailingSource), cache.clone());

        assert_eq!(discovery.refresh().await.expect("round"), 0);
        assert!(*discovery.readiness().borrow());
    }

    #[tokio::test]
    async fn test_dns_source_resolves_ip_literals() {
        let source = DnsMembershipSource::default();
        let endpoints = source.resolve("127.0.0.1:9000").await.expect("resolve");
        assert_eq!(endpoints, vec![Endpoint { address: "127.0.0.1".into(), port: 9000, weight: 1 }]);
    }
}
