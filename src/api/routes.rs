use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::validation::Validator;
use crate::xds::SnapshotCache;

use super::handlers::{
    get_snapshot_handler, health_handler, list_snapshots_handler, ready_handler, validate_handler,
};

#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<SnapshotCache>,
    /// Flips once the warm-up barrier passes; gates readiness and snapshot reads
    pub ready: watch::Receiver<bool>,
}

impl ApiState {
    pub fn new(cache: Arc<SnapshotCache>, ready: watch::Receiver<bool>) -> Self {
        Self { cache, ready }
    }
}

/// Snapshot fetch plus health probes
pub fn build_fetch_router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/readyz", get(ready_handler))
        .route("/v1/snapshots", get(list_snapshots_handler))
        .route("/v1/snapshots/{key}", get(get_snapshot_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub fn build_admission_router(validator: Arc<Validator>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/validate", post(validate_handler))
        .with_state(validator)
        .layer(TraceLayer::new_for_http())
}
