//! # Validation
//!
//! Dry-run admission checks. A candidate change is overlaid on the last
//! snapshot the synchronizer processed, pushed through the same pipeline a live
//! cycle uses, and compared with that snapshot's own findings. The validator
//! never writes to the snapshot cache or to resource status.

use crate::domain::{
    ApiSnapshot, Diagnostic, DiagnosticReport, Resource, ResourceRef, Severity,
};
use crate::observability::MetricsRecorder;
use crate::syncer::pipeline::ConfigPipeline;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// How findings translate into an admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Admit every change; findings are returned as warnings only
    pub always_accept: bool,
    /// Admit changes whose relevant findings are warnings only
    pub allow_warnings: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self { always_accept: true, allow_warnings: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateChange {
    Upsert(Resource),
    Delete(ResourceRef),
}

impl CandidateChange {
    pub fn resource_ref(&self) -> ResourceRef {
        match self {
            CandidateChange::Upsert(resource) => resource.resource_ref(),
            CandidateChange::Delete(key) => key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionResult {
    pub accepted: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl AdmissionResult {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
    }
}

#[derive(Debug, Default)]
struct Baseline {
    snapshot: ApiSnapshot,
    report: DiagnosticReport,
}

pub struct Validator {
    pipeline: ConfigPipeline,
    policy: ValidationPolicy,
    baseline: RwLock<Arc<Baseline>>,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator").field("policy", &self.policy).finish()
    }
}

impl Validator {
    pub fn new(pipeline: ConfigPipeline, policy: ValidationPolicy) -> Self {
        Self {
            pipeline,
            policy,
            baseline: RwLock::new(Arc::new(Baseline::default())),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    /// Record the snapshot (and its findings) the synchronizer just processed
    pub fn observe(&self, snapshot: ApiSnapshot, report: DiagnosticReport) {
        let next = Arc::new(Baseline { snapshot, report });
        match self.baseline.write() {
            Ok(mut baseline) => *baseline = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn current(&self) -> Arc<Baseline> {
        match self.baseline.read() {
            Ok(baseline) => Arc::clone(&baseline),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn validate(&self, change: &CandidateChange) -> AdmissionResult {
        let baseline = self.current();
        let changed = change.resource_ref();
        let candidate = match change {
            CandidateChange::Upsert(resource) => baseline.snapshot.upsert(resource.clone()),
            CandidateChange::Delete(key) => baseline.snapshot.remove(key),
        };

        let diagnostics = match self.pipeline.process(&candidate) {
            Ok(translation) => relevant_diagnostics(&changed, &translation.report, &baseline.report),
            Err(e) => {
                warn!(error = %e, resource = %changed, "dry-run translation failed");
                vec![Diagnostic {
                    resource: changed.clone(),
                    severity: Severity::Error,
                    message: format!("configuration could not be translated: {}", e),
                }]
            }
        };

        let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
        let has_warnings = diagnostics.iter().any(|d| d.severity == Severity::Warning);
        let accepted = self.policy.always_accept
            || (!has_errors && (self.policy.allow_warnings || !has_warnings));

        debug!(
            resource = %changed,
            accepted,
            errors = has_errors,
            warnings = has_warnings,
            "validated candidate change"
        );
        self.metrics.record_validation(accepted);

        AdmissionResult { accepted, diagnostics }
    }
}

/// Everything reported on the changed resource, plus findings on other
/// resources that the baseline did not already have.
fn relevant_diagnostics(
    changed: &ResourceRef,
    candidate: &DiagnosticReport,
    baseline: &DiagnosticReport,
) -> Vec<Diagnostic> {
    candidate
        .diagnostics()
        .into_iter()
        .filter(|d| {
            if &d.resource == changed {
                return true;
            }
            let known = match d.severity {
                Severity::Error => baseline.errors_for(&d.resource),
                Severity::Warning => baseline.warnings_for(&d.resource),
            };
            !known.contains(&d.message)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Gateway, Host, Matcher, ResourceKind, Route, RouteAction, Upstream, VirtualService,
    };
    use crate::sanitize::InvalidConfigPolicy;
    use crate::syncer::extension::ExtensionSet;
    use crate::translation::DefaultTranslator;

    fn pipeline() -> ConfigPipeline {
        ConfigPipeline::new(
            Arc::new(DefaultTranslator::new()),
            &InvalidConfigPolicy::default(),
            ExtensionSet::empty(),
        )
    }

    fn strict() -> ValidationPolicy {
        ValidationPolicy { always_accept: false, allow_warnings: true }
    }

    fn vs_to(upstream: &str) -> Resource {
        let mut vs = VirtualService::new("default", "vs");
        vs.routes = vec![Route::new(Matcher::Prefix("/".into()), RouteAction::forward(upstream))];
        vs.into()
    }

    fn live_snapshot() -> ApiSnapshot {
        ApiSnapshot::from_resources(vec![
            Gateway::new("default", "gw", 8080).into(),
            vs_to("echo"),
            Upstream::with_hosts("default", "echo", vec![Host::new("10.0.0.1", 80)]).into(),
        ])
    }

    fn observed(policy: ValidationPolicy) -> Validator {
        let validator = Validator::new(pipeline(), policy);
        let snapshot = live_snapshot();
        let translation = pipeline().process(&snapshot).expect("baseline");
        validator.observe(snapshot, translation.report);
        validator
    }

    #[test]
    fn test_strict_policy_rejects_broken_candidate() {
        let validator = observed(strict());
        let result = validator.validate(&CandidateChange::Upsert(vs_to("ghost")));

        assert!(!result.accepted);
        assert_eq!(result.errors().count(), 1);
    }

    #[test]
    fn test_always_accept_admits_with_diagnostics() {
        let validator = observed(ValidationPolicy::default());
        let result = validator.validate(&CandidateChange::Upsert(vs_to("ghost")));

        assert!(result.accepted);
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn test_delete_breaking_dependents_is_rejected() {
        let validator = observed(strict());
        let key = ResourceRef::new(ResourceKind::Upstream, "default", "echo");
        let result = validator.validate(&CandidateChange::Delete(key));

        assert!(!result.accepted);
        let vs = ResourceRef::new(ResourceKind::VirtualService, "default", "vs");
        assert!(result.errors().all(|d| d.resource == vs));
    }

    #[test]
    fn test_preexisting_errors_elsewhere_do_not_block() {
        let validator = Validator::new(pipeline(), strict());
        let snapshot = live_snapshot().upsert(Upstream::with_hosts("default", "empty", vec![]).into());
        let translation = pipeline().process(&snapshot).expect("baseline");
        assert!(translation.report.has_errors());
        validator.observe(snapshot, translation.report);

        let upstream = Upstream::with_hosts("default", "fresh", vec![Host::new("10.0.0.2", 80)]);
        let result = validator.validate(&CandidateChange::Upsert(upstream.into()));
        assert!(result.accepted);
        assert!(result.errors().next().is_none());
    }

    #[test]
    fn test_warnings_rejected_when_disallowed() {
        let policy = ValidationPolicy { always_accept: false, allow_warnings: false };
        let validator = observed(policy);
        let mut empty = VirtualService::new("default", "empty");
        empty.domains = vec!["empty.example.com".into()];
        let result = validator.validate(&CandidateChange::Upsert(empty.into()));

        assert!(!result.accepted);
        assert!(result.errors().next().is_none());
        assert!(result.warnings().count() >= 1);
    }

    #[test]
    fn test_validates_against_empty_snapshot_before_first_observe() {
        let validator = Validator::new(pipeline(), strict());
        let result = validator.validate(&CandidateChange::Upsert(vs_to("ghost")));
        assert!(!result.accepted);
    }
}
