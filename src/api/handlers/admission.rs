//! Admission webhook: dry-runs a proposed change through the validator.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{Resource, ResourceKind, ResourceRef};
use crate::validation::{AdmissionResult, CandidateChange, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionRequest {
    pub uid: String,
    pub operation: Operation,
    #[serde(default)]
    pub object: Option<serde_json::Value>,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionReview {
    pub request: AdmissionRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionStatus {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    pub status: AdmissionStatus,
    pub warnings: Vec<String>,
}

impl AdmissionResponse {
    fn denied(uid: String, message: String) -> Self {
        Self { uid, allowed: false, status: AdmissionStatus { message }, warnings: Vec::new() }
    }

    fn from_result(uid: String, result: &AdmissionResult) -> Self {
        let errors: Vec<String> =
            result.errors().map(|d| format!("{}: {}", d.resource, d.message)).collect();
        let mut warnings: Vec<String> =
            result.warnings().map(|d| format!("{}: {}", d.resource, d.message)).collect();

        // Admitted despite errors: surface them so the author still sees them
        if result.accepted {
            warnings.extend(errors.iter().cloned());
        }

        Self {
            uid,
            allowed: result.accepted,
            status: AdmissionStatus { message: errors.join("; ") },
            warnings,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionReviewResponse {
    pub response: AdmissionResponse,
}

fn candidate(request: &AdmissionRequest) -> Result<CandidateChange, String> {
    let kind: ResourceKind = request.kind.parse().map_err(|e: crate::Error| e.to_string())?;

    match request.operation {
        Operation::Delete => {
            Ok(CandidateChange::Delete(ResourceRef::new(kind, &request.namespace, &request.name)))
        }
        Operation::Create | Operation::Update => {
            let mut object = request
                .object
                .clone()
                .ok_or_else(|| format!("{:?} request carries no object", request.operation))?;
            if let Some(fields) = object.as_object_mut() {
                fields
                    .entry("kind")
                    .or_insert_with(|| serde_json::Value::String(kind.as_str().to_string()));
            }

            let resource: Resource = serde_json::from_value(object)
                .map_err(|e| format!("object is not a valid {}: {}", kind, e))?;
            if resource.kind() != kind {
                return Err(format!("object kind {} does not match request kind {}", resource.kind(), kind));
            }
            Ok(CandidateChange::Upsert(resource))
        }
    }
}

/// `POST /validate`
pub async fn validate_handler(
    State(validator): State<Arc<Validator>>,
    Json(review): Json<AdmissionReview>,
) -> Json<AdmissionReviewResponse> {
    let request = review.request;

    let response = match candidate(&request) {
        Ok(change) => {
            let result = validator.validate(&change);
            info!(
                uid = %request.uid,
                resource = %change.resource_ref(),
                allowed = result.accepted,
                diagnostics = result.diagnostics.len(),
                "admission review"
            );
            AdmissionResponse::from_result(request.uid, &result)
        }
        Err(message) => {
            warn!(uid = %request.uid, kind = %request.kind, error = %message, "malformed admission request");
            AdmissionResponse::denied(request.uid, message)
        }
    };

    Json(AdmissionReviewResponse { response })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(operation: Operation, object: Option<serde_json::Value>) -> AdmissionRequest {
        AdmissionRequest {
            uid: "abc".into(),
            operation,
            object,
            kind: "Upstream".into(),
            namespace: "default".into(),
            name: "echo".into(),
        }
    }

    #[test]
    fn test_candidate_fills_missing_kind() {
        let object = serde_json::json!({
            "metadata": { "namespace": "default", "name": "echo" },
            "spec": { "static": { "hosts": [{ "address": "10.0.0.1", "port": 80 }] } }
        });
        let change = candidate(&request(Operation::Create, Some(object))).expect("candidate");
        assert_eq!(
            change.resource_ref(),
            ResourceRef::new(ResourceKind::Upstream, "default", "echo")
        );
    }

    #[test]
    fn test_delete_needs_no_object() {
        let change = candidate(&request(Operation::Delete, None)).expect("candidate");
        assert!(matches!(change, CandidateChange::Delete(_)));
    }

    #[test]
    fn test_update_without_object_is_malformed() {
        let err = candidate(&request(Operation::Update, None)).expect_err("no object");
        assert!(err.contains("no object"));
    }

    #[test]
    fn test_kind_mismatch_is_malformed() {
        let object = serde_json::json!({
            "kind": "Gateway",
            "metadata": { "namespace": "default", "name": "echo" },
            "bindPort": 8080
        });
        let err = candidate(&request(Operation::Create, Some(object))).expect_err("mismatch");
        assert!(err.contains("does not match"));
    }
}
