//! # HTTP Surfaces
//!
//! Two axum servers beside the gRPC ADS endpoint: the REST fetch server
//! (snapshot reads plus health probes) and the admission webhook that dry-runs
//! proposed changes through the validator.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_admission_router, build_fetch_router, ApiState};
pub use server::{start_admission_server, start_rest_server};
