//! Per-resource findings produced by translation, sanitization and extensions.

use super::{ResourceRef, ResourceStatus, StatusState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub resource: ResourceRef,
    pub severity: Severity,
    pub message: String,
}

/// Findings for one resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ResourceReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Findings for every resource a cycle looked at, in canonical order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    entries: BTreeMap<ResourceRef, ResourceReport>,
}

impl DiagnosticReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource so it is reported even without findings
    pub fn accept(&mut self, resource: &ResourceRef) {
        self.entries.entry(resource.clone()).or_default();
    }

    pub fn add_error(&mut self, resource: &ResourceRef, message: impl Into<String>) {
        let message = message.into();
        let entry = self.entries.entry(resource.clone()).or_default();
        if !entry.errors.contains(&message) {
            entry.errors.push(message);
        }
    }

    pub fn add_warning(&mut self, resource: &ResourceRef, message: impl Into<String>) {
        let message = message.into();
        let entry = self.entries.entry(resource.clone()).or_default();
        if !entry.warnings.contains(&message) {
            entry.warnings.push(message);
        }
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.add_error(&diagnostic.resource, diagnostic.message),
            Severity::Warning => self.add_warning(&diagnostic.resource, diagnostic.message),
        }
    }

    pub fn merge(&mut self, other: DiagnosticReport) {
        for (resource, report) in other.entries {
            self.accept(&resource);
            for error in report.errors {
                self.add_error(&resource, error);
            }
            for warning in report.warnings {
                self.add_warning(&resource, warning);
            }
        }
    }

    pub fn has_errors(&self) -> bool {
        self.entries.values().any(|r| !r.errors.is_empty())
    }

    pub fn has_errors_for(&self, resource: &ResourceRef) -> bool {
        !self.errors_for(resource).is_empty()
    }

    pub fn errors_for(&self, resource: &ResourceRef) -> &[String] {
        self.entries.get(resource).map(|r| r.errors.as_slice()).unwrap_or_default()
    }

    pub fn warnings_for(&self, resource: &ResourceRef) -> &[String] {
        self.entries.get(resource).map(|r| r.warnings.as_slice()).unwrap_or_default()
    }

    pub fn get(&self, resource: &ResourceRef) -> Option<&ResourceReport> {
        self.entries.get(resource)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceRef, &ResourceReport)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattened findings, errors before warnings within a resource
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (resource, report) in &self.entries {
            out.extend(report.errors.iter().map(|message| Diagnostic {
                resource: resource.clone(),
                severity: Severity::Error,
                message: message.clone(),
            }));
            out.extend(report.warnings.iter().map(|message| Diagnostic {
                resource: resource.clone(),
                severity: Severity::Warning,
                message: message.clone(),
            }));
        }
        out
    }

    /// Status derived from the findings: Rejected on errors, Warning on warnings only
    pub fn status_for(&self, resource: &ResourceRef, owner: &str, generation: u64) -> ResourceStatus {
        let (state, reason) = match self.entries.get(resource) {
            Some(report) if !report.errors.is_empty() => {
                (StatusState::Rejected, report.errors.join("; "))
            }
            Some(report) if !report.warnings.is_empty() => {
                (StatusState::Warning, report.warnings.join("; "))
            }
            _ => (StatusState::Accepted, String::new()),
        };
        ResourceStatus {
            state,
            reason,
            reported_by: owner.to_string(),
            observed_generation: generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKind;

    fn vs(name: &str) -> ResourceRef {
        ResourceRef::new(ResourceKind::VirtualService, "default", name)
    }

    #[test]
    fn test_status_derivation() {
        let mut report = DiagnosticReport::new();
        report.accept(&vs("clean"));
        report.add_warning(&vs("warned"), "no routes");
        report.add_error(&vs("broken"), "missing upstream");
        report.add_warning(&vs("broken"), "no routes");

        assert_eq!(report.status_for(&vs("clean"), "flowsync", 3).state, StatusState::Accepted);
        let warned = report.status_for(&vs("warned"), "flowsync", 1);
        assert_eq!(warned.state, StatusState::Warning);
        assert_eq!(warned.reason, "no routes");
        let broken = report.status_for(&vs("broken"), "flowsync", 9);
        assert_eq!(broken.state, StatusState::Rejected);
        assert_eq!(broken.observed_generation, 9);
        assert_eq!(broken.reported_by, "flowsync");
    }

    #[test]
    fn test_duplicate_messages_collapse() {
        let mut report = DiagnosticReport::new();
        report.add_error(&vs("a"), "boom");
        report.add_error(&vs("a"), "boom");

        assert_eq!(report.errors_for(&vs("a")).len(), 1);
    }

    #[test]
    fn test_merge_keeps_accepted_entries() {
        let mut left = DiagnosticReport::new();
        left.add_error(&vs("a"), "boom");

        let mut right = DiagnosticReport::new();
        right.accept(&vs("b"));
        right.add_error(&vs("a"), "boom");
        right.add_warning(&vs("a"), "careful");

        left.merge(right);
        assert_eq!(left.len(), 2);
        assert_eq!(left.errors_for(&vs("a")), &["boom".to_string()]);
        assert_eq!(left.warnings_for(&vs("a")), &["careful".to_string()]);
        assert!(left.get(&vs("b")).is_some_and(ResourceReport::is_clean));
    }

    #[test]
    fn test_diagnostics_are_ordered() {
        let mut report = DiagnosticReport::new();
        report.add_warning(&vs("b"), "w");
        report.add_error(&vs("a"), "e");

        let diagnostics = report.diagnostics();
        assert_eq!(diagnostics[0].resource, vs("a"));
        assert_eq!(diagnostics[1].severity, Severity::Warning);
    }
}
