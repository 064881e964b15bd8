//! # xDS Serving
//!
//! Envoy-facing side of flowsync: the per-consumer snapshot cache, rendering
//! of proxy graphs into Envoy v3 resources and the state-of-the-world ADS
//! server.

pub mod cache;
pub mod node;
pub mod resources;
pub mod server;
pub mod stream;

pub use cache::{Snapshot, SnapshotCache};
pub use node::{ConsumerKey, DISCOVERY_KEY, FALLBACK_KEY};
pub use resources::{
    build_resources, BuiltResource, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL,
    ROUTE_TYPE_URL,
};
pub use server::{start_xds_server, FlowsyncDiscoveryService};
pub use stream::run_stream_loop;
