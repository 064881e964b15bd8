//! Read-only view of the snapshot cache for polling clients and debugging

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::api::{error::ApiError, routes::ApiState};
use crate::xds::{ConsumerKey, Snapshot, FALLBACK_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub key: String,
    pub version: u64,
    pub listeners: usize,
    pub route_tables: usize,
    pub clusters: usize,
    pub endpoint_sets: usize,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            key: snapshot.key.to_string(),
            version: snapshot.version,
            listeners: snapshot.graph.listeners.len(),
            route_tables: snapshot.graph.route_tables.len(),
            clusters: snapshot.graph.clusters.len(),
            endpoint_sets: snapshot.graph.endpoints.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SnapshotList {
    pub snapshots: Vec<SnapshotSummary>,
}

/// Snapshots stay hidden until warm-up passes, matching what ADS would serve
fn ensure_warm(state: &ApiState) -> Result<(), ApiError> {
    if *state.ready.borrow() {
        Ok(())
    } else {
        Err(ApiError::ServiceUnavailable("control plane is still warming up".to_string()))
    }
}

/// `GET /v1/snapshots`
pub async fn list_snapshots_handler(
    State(state): State<ApiState>,
) -> Result<Json<SnapshotList>, ApiError> {
    ensure_warm(&state)?;
    let snapshots = state.cache.snapshots().iter().map(SnapshotSummary::from).collect();
    Ok(Json(SnapshotList { snapshots }))
}

/// `GET /v1/snapshots/{key}` where `key` is `namespace~proxy` or the fallback key
pub async fn get_snapshot_handler(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    ensure_warm(&state)?;
    let key = if key == FALLBACK_KEY {
        ConsumerKey::fallback()
    } else {
        ConsumerKey::parse(&key)
            .ok_or_else(|| ApiError::BadRequest(format!("'{}' is not a namespace~proxy key", key)))?
    };

    state
        .cache
        .get_snapshot(&key)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no snapshot for {}", key)))
}
