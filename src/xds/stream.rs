//! State-of-the-world ADS stream handling.
//!
//! One task per stream. The consumer key is taken from the node on the first
//! request; from then on the stream wakes on its own key's version watch and
//! on the discovery key (endpoint sets only). Responses are tracked per type
//! URL so ACKs, NACKs and stale nonces can be told apart.

use super::cache::{Snapshot, SnapshotCache};
use super::node::ConsumerKey;
use super::resources::{
    build_resources, BuiltResource, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL,
    ROUTE_TYPE_URL,
};
use crate::observability::MetricsRecorder;
use envoy_types::pb::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use futures::Stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Push order for a new version: clusters before their endpoints, listeners
/// before their route tables
const PUSH_ORDER: [&str; 4] = [CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL, ROUTE_TYPE_URL];

#[derive(Debug, Clone)]
struct SentResponse {
    version: String,
    nonce: String,
}

#[derive(Debug, Default)]
struct Subscription {
    resource_names: Vec<String>,
    sent: Option<SentResponse>,
}

/// Per-stream protocol state, independent of the transport
struct AdsStream {
    cache: Arc<SnapshotCache>,
    key: Option<ConsumerKey>,
    subscriptions: HashMap<String, Subscription>,
    metrics: MetricsRecorder,
}

impl AdsStream {
    fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache, key: None, subscriptions: HashMap::new(), metrics: MetricsRecorder::new() }
    }

    fn identify(&mut self, request: &DiscoveryRequest) -> ConsumerKey {
        let key = ConsumerKey::from_node(request.node.as_ref());
        let node_id = request.node.as_ref().map(|n| n.id.as_str()).unwrap_or_default();
        if key.is_fallback() {
            warn!(node_id = %node_id, "node has no usable role metadata, serving fallback configuration");
        } else {
            info!(node_id = %node_id, key = %key, "ADS stream identified");
        }
        self.key = Some(key.clone());
        key
    }

    fn on_request(&mut self, request: DiscoveryRequest) -> Option<DiscoveryResponse> {
        let type_url = request.type_url.clone();
        let subscription = self.subscriptions.entry(type_url.clone()).or_default();
        let names_changed = subscription.resource_names != request.resource_names;
        subscription.resource_names = request.resource_names;

        if let Some(error_detail) = request.error_detail.as_ref() {
            warn!(
                type_url = %type_url,
                version = %request.version_info,
                nonce = %request.response_nonce,
                error_code = error_detail.code,
                error_message = %error_detail.message,
                "[NACK] Envoy rejected previous response"
            );
            self.metrics.record_xds_ack(&type_url, false);
            return None;
        }

        if !request.response_nonce.is_empty() {
            let current = subscription.sent.as_ref().map(|s| s.nonce.as_str());
            if current != Some(request.response_nonce.as_str()) {
                debug!(type_url = %type_url, nonce = %request.response_nonce, "ignoring request with stale nonce");
                return None;
            }
            if !names_changed {
                debug!(type_url = %type_url, version = %request.version_info, "[ACK] response applied");
                self.metrics.record_xds_ack(&type_url, true);
                return None;
            }
        }

        self.respond(&type_url, true)
    }

    /// Responses for every subscribed type whose version moved
    fn on_change(&mut self) -> Vec<DiscoveryResponse> {
        let subscribed: Vec<&str> = PUSH_ORDER
            .into_iter()
            .filter(|type_url| self.subscriptions.contains_key(*type_url))
            .collect();
        subscribed.into_iter().filter_map(|type_url| self.respond(type_url, false)).collect()
    }

    fn respond(&mut self, type_url: &str, force: bool) -> Option<DiscoveryResponse> {
        let key = self.key.as_ref()?;
        let snapshot = self.cache.get_snapshot(key)?;
        let discovered = if type_url == ENDPOINT_TYPE_URL {
            self.cache.get_snapshot(&ConsumerKey::discovery())
        } else {
            None
        };
        let version = response_version(type_url, &snapshot, discovered.as_ref());

        let subscription = self.subscriptions.get_mut(type_url)?;
        let already_sent = subscription.sent.as_ref().is_some_and(|s| s.version == version);
        if already_sent && !force {
            return None;
        }

        let mut resources =
            build_resources(type_url, &snapshot.graph, discovered.as_ref().map(|d| d.graph.as_ref()));
        let named = type_url == ROUTE_TYPE_URL || type_url == ENDPOINT_TYPE_URL;
        if named && !subscription.resource_names.is_empty() {
            resources.retain(|r| subscription.resource_names.contains(&r.name));
        }

        let nonce = Uuid::new_v4().to_string();
        subscription.sent = Some(SentResponse { version: version.clone(), nonce: nonce.clone() });

        info!(
            key = %key,
            type_url = %type_url,
            version = %version,
            resource_count = resources.len(),
            "sending discovery response"
        );

        Some(DiscoveryResponse {
            version_info: version,
            resources: resources.into_iter().map(BuiltResource::into_any).collect(),
            type_url: type_url.to_string(),
            nonce,
            ..Default::default()
        })
    }
}

/// Endpoint responses also move when discovery publishes
fn response_version(type_url: &str, snapshot: &Snapshot, discovered: Option<&Snapshot>) -> String {
    if type_url == ENDPOINT_TYPE_URL {
        format!("{}.{}", snapshot.version, discovered.map(|d| d.version).unwrap_or(0))
    } else {
        snapshot.version.to_string()
    }
}

async fn next_version(rx: &mut Option<watch::Receiver<u64>>) -> bool {
    match rx {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

enum StreamEvent {
    Request(DiscoveryRequest),
    Changed,
    Closed,
}

/// Run the SotW ADS loop for one stream until the client leaves or `cancel` fires
pub fn run_stream_loop<S>(
    cache: Arc<SnapshotCache>,
    mut requests: S,
    cancel: CancellationToken,
) -> ReceiverStream<std::result::Result<DiscoveryResponse, Status>>
where
    S: Stream<Item = std::result::Result<DiscoveryRequest, Status>> + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let metrics = MetricsRecorder::new();
        let mut stream = AdsStream::new(cache.clone());
        let mut key_rx: Option<watch::Receiver<u64>> = None;
        let mut discovery_rx = cache.subscribe(&ConsumerKey::discovery());

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutting down ADS stream");
                    StreamEvent::Closed
                }
                request = requests.next() => match request {
                    Some(Ok(request)) => StreamEvent::Request(request),
                    Some(Err(status)) => {
                        warn!(error = %status, "error receiving discovery request");
                        StreamEvent::Closed
                    }
                    None => {
                        info!("ADS stream ended by client");
                        StreamEvent::Closed
                    }
                },
                open = next_version(&mut key_rx) => {
                    if open { StreamEvent::Changed } else { StreamEvent::Closed }
                }
                open = discovery_rx.changed() => {
                    if open.is_ok() { StreamEvent::Changed } else { StreamEvent::Closed }
                }
            };

            let responses = match event {
                StreamEvent::Closed => break,
                StreamEvent::Changed => stream.on_change(),
                StreamEvent::Request(request) => {
                    if key_rx.is_none() {
                        let key = stream.identify(&request);
                        key_rx = Some(cache.subscribe(&key));
                        metrics.record_xds_connection(true);
                    }
                    stream.on_request(request).into_iter().collect()
                }
            };

            for response in responses {
                if tx.send(Ok(response)).await.is_err() {
                    debug!("discovery response receiver dropped");
                    break;
                }
            }
            if tx.is_closed() {
                break;
            }
        }

        if key_rx.is_some() {
            metrics.record_xds_connection(false);
        }
    });

    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::{ClusterFragment, Fragment, ProxyGraph};
    use envoy_types::pb::envoy::config::core::v3::Node;
    use envoy_types::pb::google::protobuf::{value::Kind, Struct, Value};
    use envoy_types::pb::google::rpc::Status as RpcStatus;
    use std::time::Duration;

    fn node(role: &str) -> Node {
        let fields = [("role".to_string(), Value { kind: Some(Kind::StringValue(role.into())) })];
        Node {
            id: "envoy".into(),
            metadata: Some(Struct { fields: fields.into_iter().collect() }),
            ..Default::default()
        }
    }

    fn graph(cluster: &str) -> ProxyGraph {
        let mut graph = ProxyGraph::new();
        graph.insert(Fragment::Cluster(ClusterFragment {
            name: cluster.into(),
            connect_timeout_ms: 5000,
            tls: None,
            service: None,
            origin: None,
        }));
        graph
    }

    fn request(role: &str, type_url: &str) -> DiscoveryRequest {
        DiscoveryRequest { node: Some(node(role)), type_url: type_url.into(), ..Default::default() }
    }

    type Harness = (
        mpsc::Sender<std::result::Result<DiscoveryRequest, Status>>,
        ReceiverStream<std::result::Result<DiscoveryResponse, Status>>,
    );

    fn harness(cache: Arc<SnapshotCache>) -> Harness {
        let (tx, rx) = mpsc::channel(8);
        let responses = run_stream_loop(cache, ReceiverStream::new(rx), CancellationToken::new());
        (tx, responses)
    }

    async fn next(responses: &mut ReceiverStream<std::result::Result<DiscoveryResponse, Status>>) -> DiscoveryResponse {
        tokio::time::timeout(Duration::from_secs(2), responses.next())
            .await
            .expect("response in time")
            .expect("stream open")
            .expect("ok response")
    }

    async fn assert_quiet(responses: &mut ReceiverStream<std::result::Result<DiscoveryResponse, Status>>) {
        let waited = tokio::time::timeout(Duration::from_millis(100), responses.next()).await;
        assert!(waited.is_err(), "unexpected response");
    }

    #[tokio::test]
    async fn test_initial_request_ack_and_push() {
        let cache = Arc::new(SnapshotCache::new());
        let key = ConsumerKey::new("default", "proxy");
        cache.set_snapshot(&key, graph("a"));
        let (tx, mut responses) = harness(cache.clone());

        tx.send(Ok(request("default~proxy", CLUSTER_TYPE_URL))).await.expect("send");
        let first = next(&mut responses).await;
        assert_eq!(first.version_info, "1");
        assert_eq!(first.resources.len(), 1);

        let ack = DiscoveryRequest {
            version_info: first.version_info.clone(),
            response_nonce: first.nonce.clone(),
            ..request("default~proxy", CLUSTER_TYPE_URL)
        };
        tx.send(Ok(ack)).await.expect("send");
        assert_quiet(&mut responses).await;

        cache.set_snapshot(&key, graph("b"));
        let pushed = next(&mut responses).await;
        assert_eq!(pushed.version_info, "2");
    }

    #[tokio::test]
    async fn test_nack_does_not_resend() {
        let cache = Arc::new(SnapshotCache::new());
        cache.set_snapshot(&ConsumerKey::new("default", "proxy"), graph("a"));
        let (tx, mut responses) = harness(cache);

        tx.send(Ok(request("default~proxy", CLUSTER_TYPE_URL))).await.expect("send");
        let first = next(&mut responses).await;

        let nack = DiscoveryRequest {
            response_nonce: first.nonce.clone(),
            error_detail: Some(RpcStatus { code: 3, message: "bad cluster".into(), details: vec![] }),
            ..request("default~proxy", CLUSTER_TYPE_URL)
        };
        tx.send(Ok(nack)).await.expect("send");
        assert_quiet(&mut responses).await;
    }

    #[tokio::test]
    async fn test_other_keys_do_not_wake_stream() {
        let cache = Arc::new(SnapshotCache::new());
        cache.set_snapshot(&ConsumerKey::new("default", "a"), graph("a"));
        let (tx, mut responses) = harness(cache.clone());

        tx.send(Ok(request("default~a", LISTENER_TYPE_URL))).await.expect("send");
        next(&mut responses).await;

        cache.set_snapshot(&ConsumerKey::new("default", "b"), graph("b"));
        assert_quiet(&mut responses).await;
    }

    #[tokio::test]
    async fn test_waits_for_first_snapshot() {
        let cache = Arc::new(SnapshotCache::new());
        let (tx, mut responses) = harness(cache.clone());

        tx.send(Ok(request("bad-role", CLUSTER_TYPE_URL))).await.expect("send");
        assert_quiet(&mut responses).await;

        cache.set_snapshot(&ConsumerKey::fallback(), graph("fallback"));
        let response = next(&mut responses).await;
        assert_eq!(response.version_info, "1");
    }

    #[tokio::test]
    async fn test_endpoint_version_tracks_discovery() {
        let cache = Arc::new(SnapshotCache::new());
        cache.set_snapshot(&ConsumerKey::new("default", "proxy"), graph("a"));
        let (tx, mut responses) = harness(cache.clone());

        tx.send(Ok(request("default~proxy", ENDPOINT_TYPE_URL))).await.expect("send");
        assert_eq!(next(&mut responses).await.version_info, "1.0");

        let mut discovered = ProxyGraph::new();
        discovered.insert(Fragment::Endpoints(crate::translation::EndpointSet {
            cluster: "a".into(),
            endpoints: vec![],
        }));
        cache.set_snapshot(&ConsumerKey::discovery(), discovered);
        assert_eq!(next(&mut responses).await.version_info, "1.1");
    }
}
