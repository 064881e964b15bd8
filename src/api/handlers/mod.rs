pub mod admission;
pub mod health;
pub mod snapshots;

pub use admission::{
    validate_handler, AdmissionRequest, AdmissionResponse, AdmissionReview,
    AdmissionReviewResponse, Operation,
};
pub use health::{health_handler, ready_handler, HealthResponse};
pub use snapshots::{get_snapshot_handler, list_snapshots_handler, SnapshotList, SnapshotSummary};
