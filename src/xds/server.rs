//! gRPC ADS server backed by the snapshot cache

use super::cache::SnapshotCache;
use super::stream::run_stream_loop;
use crate::config::XdsConfig;
use crate::errors::{FlowsyncError, Result};
use envoy_types::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::{
        AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
    },
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};
use futures::Stream;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{transport::Server, Request, Response, Status};
use tracing::info;

#[derive(Debug, Clone)]
pub struct FlowsyncDiscoveryService {
    cache: Arc<SnapshotCache>,
    cancel: CancellationToken,
}

impl FlowsyncDiscoveryService {
    pub fn new(cache: Arc<SnapshotCache>, cancel: CancellationToken) -> Self {
        Self { cache, cancel }
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for FlowsyncDiscoveryService {
    type StreamAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DiscoveryResponse, Status>> + Send>>;
    type DeltaAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DeltaDiscoveryResponse, Status>> + Send>>;

    async fn stream_aggregated_resources(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        info!(peer = ?request.remote_addr(), "new ADS stream connection established");
        let stream =
            run_stream_loop(self.cache.clone(), request.into_inner(), self.cancel.child_token());
        Ok(Response::new(Box::pin(stream)))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(Status::unimplemented("incremental xDS is not served; use state-of-the-world ADS"))
    }
}

/// Serve ADS on the configured address until `cancel` fires
pub async fn start_xds_server(
    config: &XdsConfig,
    cache: Arc<SnapshotCache>,
    cancel: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        FlowsyncError::config(format!("Invalid xDS bind address '{}': {}", config.bind_address, e))
    })?;

    let service = FlowsyncDiscoveryService::new(cache, cancel.clone());
    info!(address = %addr, "xDS server listening");

    Server::builder()
        .add_service(AggregatedDiscoveryServiceServer::new(service))
        .serve_with_shutdown(addr, cancel.cancelled_owned())
        .await
        .map_err(|e| {
            let message = e.to_string();
            if message.contains("Address already in use") || message.contains("bind") {
                FlowsyncError::transport(format!(
                    "xDS server failed to bind to {}: port {} is already in use",
                    addr,
                    addr.port()
                ))
            } else {
                FlowsyncError::transport(format!("xDS server failed: {}", e))
            }
        })?;

    info!("xDS server stopped");
    Ok(())
}
