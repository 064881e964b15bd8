//! Liveness and readiness probes

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::routes::ApiState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    fn new(status: &str) -> Self {
        Self { status: status.to_string() }
    }
}

/// Returns 200 while the process is serving requests
pub async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse::new("ok")))
}

/// Returns 200 once warm-up has passed and ADS is serving, 503 before that
pub async fn ready_handler(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    if *state.ready.borrow() {
        (StatusCode::OK, Json(HealthResponse::new("ready")))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::new("warming")))
    }
}
